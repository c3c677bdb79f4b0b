use crate::domain::article::Article;
use crate::domain::ports::ChangePublisher;
use crate::types::config::RabbitMqConfig;
use crate::types::{InfraError, InfraResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// 永続配信モード
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// 配信メッセージの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
}

impl Action {
    pub fn from_is_new(is_new: bool) -> Self {
        if is_new {
            Self::Create
        } else {
            Self::Update
        }
    }
}

/// ブローカーへ送る記事変更メッセージ
#[derive(Debug, Serialize)]
pub struct ArticleMessage<'a> {
    pub action: Action,
    pub article: &'a Article,
    pub timestamp: DateTime<Utc>,
}

impl<'a> ArticleMessage<'a> {
    pub fn new(article: &'a Article, is_new: bool) -> Self {
        Self {
            action: Action::from_is_new(is_new),
            article,
            timestamp: Utc::now(),
        }
    }
}

/// RabbitMQへ記事の変更を配信するパブリッシャー
pub struct RabbitMqPublisher {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl RabbitMqPublisher {
    /// 接続し、exchange・queueの宣言とバインドを行う
    pub async fn connect(config: &RabbitMqConfig) -> InfraResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| InfraError::broker("接続", e))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| InfraError::broker("チャネル作成", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| InfraError::broker("配信確認モードの有効化", e))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| InfraError::broker("exchangeの宣言", e))?;

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| InfraError::broker("queueの宣言", e))?;

        channel
            .queue_bind(
                &config.queue_name,
                &config.exchange,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| InfraError::broker("queueのバインド", e))?;

        info!(
            exchange = %config.exchange,
            queue = %config.queue_name,
            routing_key = %config.routing_key,
            "RabbitMQに接続しました"
        );

        Ok(Self {
            connection,
            channel,
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
        })
    }
}

#[async_trait]
impl ChangePublisher for RabbitMqPublisher {
    #[instrument(level = "debug", skip(self, article), fields(external_id = article.external_id))]
    async fn publish(&self, article: &Article, is_new: bool) -> InfraResult<()> {
        let message = ArticleMessage::new(article, is_new);
        let payload = serde_json::to_vec(&message)
            .map_err(|e| InfraError::serialization("記事メッセージ", e))?;

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE),
            )
            .await
            .map_err(|e| InfraError::broker("メッセージ配信", e))?
            .await
            .map_err(|e| InfraError::broker("配信確認の待機", e))?;

        if confirm.is_nack() {
            return Err(InfraError::backend(format!(
                "ブローカーが配信を拒否しました: external_id={}",
                article.external_id
            )));
        }

        debug!(action = ?message.action, "記事の変更を配信しました");
        Ok(())
    }

    async fn close(&self) -> InfraResult<()> {
        self.channel
            .close(200, "OK")
            .await
            .map_err(|e| InfraError::broker("チャネルのクローズ", e))?;
        self.connection
            .close(200, "OK")
            .await
            .map_err(|e| InfraError::broker("接続のクローズ", e))?;
        info!("RabbitMQ接続を閉じました");
        Ok(())
    }
}
