mod device_selector;
mod error;
mod fold_until_stop;

pub use device_selector::device_selector;
pub use error::TuiError;
pub use fold_until_stop::fold_until_stop;
