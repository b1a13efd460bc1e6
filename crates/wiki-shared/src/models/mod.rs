mod category;
mod page;
mod setting;
mod tag;
mod user;

pub use category::*;
pub use page::*;
pub use setting::*;
pub use tag::*;
pub use user::*;
