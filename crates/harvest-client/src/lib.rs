#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod fetcher;
mod html;
pub mod listing;
pub mod menu;
pub mod price;
pub mod product;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use fetcher::{DEFAULT_USER_AGENT, ReqwestFetcher};
pub use listing::{LISTING_ENTRY_SELECTOR, StoreListingParser};
pub use menu::MenuParser;
pub use price::normalize_price;
pub use product::{PRODUCT_MODAL_SELECTOR, ProductParser};
