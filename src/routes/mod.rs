mod article;
mod health;
mod home;
mod locale;
mod logout;

pub use article::{ArticleIndex, ArticleShow, PAGE_SIZE};
pub use health::ping;
pub use home::Home;
pub use locale::ChangeLocale;
pub use logout::Logout;
