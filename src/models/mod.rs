// Storefront domain models
pub mod allow_set;
pub mod cart;
pub mod catalog_item;

pub use allow_set::AllowSet;
pub use cart::{normalize_quantity, parse_untrusted_cart, CartLine, PricedCart, ReconciledLine};
pub use catalog_item::CatalogItem;
