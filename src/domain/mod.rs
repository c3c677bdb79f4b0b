pub mod article;
pub mod ports;
pub mod sync;

pub use article::{Article, Tag};
pub use ports::{
    ArticleStore, ChangePublisher, ContentSource, SyncStateStore, TagStore, UnitOfWork,
};
pub use sync::{SyncState, SyncStats};
