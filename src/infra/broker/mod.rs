pub mod mock;
pub mod rabbitmq;

pub use mock::MockPublisher;
pub use rabbitmq::{Action, ArticleMessage, RabbitMqPublisher};
