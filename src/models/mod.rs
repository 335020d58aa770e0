mod article;
mod author;
mod profile;

pub use article::Article;
pub use author::Author;
pub use profile::Profile;
