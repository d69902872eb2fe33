pub mod api;
pub mod collation;
pub mod config;
pub mod entities;
pub mod error;
pub mod gallery;
pub mod locks;
pub mod maintenance;
pub mod search;
pub mod storage;
pub mod utils;

pub use error::{GalleryError, Result};
pub use gallery::Gallery;
