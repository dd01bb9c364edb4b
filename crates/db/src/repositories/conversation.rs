use std::str::FromStr;

use chrono::Utc;
use sqlx::Row;

use shopdesk_core::domain::conversation::{
    Conversation, ConversationId, Message, NewConversation, Sender,
};
use shopdesk_core::domain::entity::FormattedEntity;
use shopdesk_core::domain::intent::IntentName;

use super::rows::{decode, format_timestamp, parse_timestamp};
use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_messages(&self, conversation_id: i64) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, sender, content, timestamp, entities_json, intent
             FROM conversation_message WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn list_where(&self, clause: &str) -> Result<Vec<Conversation>, RepositoryError> {
        let sql = format!(
            "SELECT id, user_id, intent, active, created_at, updated_at
             FROM conversation {clause} ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut conversation = row_to_conversation(row)?;
            conversation.messages = self.load_messages(conversation.id.0).await?;
            conversations.push(conversation);
        }
        Ok(conversations)
    }
}

fn sender_as_str(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Bot => "bot",
    }
}

fn parse_sender(value: &str) -> Result<Sender, RepositoryError> {
    match value {
        "user" => Ok(Sender::User),
        "bot" => Ok(Sender::Bot),
        other => Err(RepositoryError::Decode(format!("unknown sender `{other}`"))),
    }
}

fn parse_intent(value: Option<String>) -> Result<Option<IntentName>, RepositoryError> {
    value
        .map(|raw| IntentName::from_str(&raw).map_err(|e| RepositoryError::Decode(e.to_string())))
        .transpose()
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let sender: String = decode(row.try_get("sender"))?;
    let timestamp: String = decode(row.try_get("timestamp"))?;
    let entities_json: Option<String> = decode(row.try_get("entities_json"))?;

    let entities = entities_json
        .map(|raw| {
            serde_json::from_str::<Vec<FormattedEntity>>(&raw)
                .map_err(|e| RepositoryError::Decode(format!("entities_json: {e}")))
        })
        .transpose()?;

    Ok(Message {
        id: decode(row.try_get("id"))?,
        sender: parse_sender(&sender)?,
        content: decode(row.try_get("content"))?,
        timestamp: parse_timestamp("timestamp", &timestamp)?,
        entities,
        intent: parse_intent(decode(row.try_get("intent"))?)?,
    })
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    Ok(Conversation {
        id: ConversationId(decode(row.try_get("id"))?),
        user_id: decode(row.try_get("user_id"))?,
        intent: parse_intent(decode(row.try_get("intent"))?)?,
        messages: Vec::new(),
        active: decode(row.try_get("active"))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

async fn insert_message(
    conn: &mut sqlx::SqliteConnection,
    conversation_id: i64,
    message: &Message,
) -> Result<(), RepositoryError> {
    let entities_json = message
        .entities
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    sqlx::query(
        "INSERT INTO conversation_message
             (conversation_id, seq, id, sender, content, timestamp, entities_json, intent)
         VALUES (?, (SELECT IFNULL(MAX(seq), 0) + 1 FROM conversation_message
                     WHERE conversation_id = ?), ?, ?, ?, ?, ?, ?)",
    )
    .bind(conversation_id)
    .bind(conversation_id)
    .bind(&message.id)
    .bind(sender_as_str(message.sender))
    .bind(&message.content)
    .bind(format_timestamp(message.timestamp))
    .bind(entities_json)
    .bind(message.intent.map(IntentName::as_str))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, intent, active, created_at, updated_at
             FROM conversation WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(ref row) = row else {
            return Ok(None);
        };
        let mut conversation = row_to_conversation(row)?;
        conversation.messages = self.load_messages(id.0).await?;
        Ok(Some(conversation))
    }

    async fn create(&self, conversation: NewConversation) -> Result<Conversation, RepositoryError> {
        conversation.validate()?;
        let mut created = conversation.into_conversation(ConversationId(0), Utc::now());

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO conversation (user_id, intent, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(created.user_id)
        .bind(created.intent.map(IntentName::as_str))
        .bind(created.active)
        .bind(format_timestamp(created.created_at))
        .bind(format_timestamp(created.updated_at))
        .execute(&mut *tx)
        .await?;
        let conversation_id = result.last_insert_rowid();

        for message in &created.messages {
            insert_message(&mut tx, conversation_id, message).await?;
        }
        tx.commit().await?;

        created.id = ConversationId(conversation_id);
        Ok(created)
    }

    async fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> Result<Option<Conversation>, RepositoryError> {
        message.validate()?;

        let mut tx = self.pool.begin().await?;
        let touched = sqlx::query("UPDATE conversation SET updated_at = ? WHERE id = ?")
            .bind(format_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        insert_message(&mut tx, id.0, &message).await?;
        tx.commit().await?;

        self.find_by_id(id).await
    }

    async fn list_active(&self) -> Result<Vec<Conversation>, RepositoryError> {
        self.list_where("WHERE active = 1").await
    }

    async fn list_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
        self.list_where("").await
    }

    async fn set_active(
        &self,
        id: ConversationId,
        active: bool,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let result = sqlx::query("UPDATE conversation SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(format_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use shopdesk_core::domain::conversation::{ConversationId, Message, NewConversation, Sender};
    use shopdesk_core::domain::entity::{EntityType, FormattedEntity};
    use shopdesk_core::domain::intent::IntentName;

    use super::SqlConversationRepository;
    use crate::repositories::ConversationRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlConversationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationRepository::new(pool)
    }

    fn opening_turn() -> NewConversation {
        let now = Utc::now();
        let entities =
            vec![FormattedEntity { entity: EntityType::OrderNumber, value: "38291".to_string() }];
        NewConversation {
            user_id: None,
            intent: Some(IntentName::OrderStatus),
            messages: vec![
                Message::user("status of order #38291", IntentName::OrderStatus, entities, now),
                Message::bot("Order #38291 has been completed.", IntentName::OrderStatus, now),
            ],
            active: true,
        }
    }

    #[tokio::test]
    async fn create_persists_messages_with_entities() {
        let repo = setup().await;
        let created = repo.create(opening_turn()).await.expect("create");

        let found = repo.find_by_id(created.id).await.expect("find").expect("exists");
        assert_eq!(found.messages.len(), 2);
        assert_eq!(found.messages[0].sender, Sender::User);
        assert_eq!(found.messages[0].entities.as_ref().map(Vec::len), Some(1));
        assert_eq!(found.messages[1].entities, None);
        assert_eq!(found.messages[0].id, created.messages[0].id);
        assert_eq!(found.intent, Some(IntentName::OrderStatus));
    }

    #[tokio::test]
    async fn append_keeps_arrival_order() {
        let repo = setup().await;
        let created = repo.create(opening_turn()).await.expect("create");

        let now = Utc::now();
        repo.append_message(created.id, Message::user("thanks", IntentName::Goodbye, Vec::new(), now))
            .await
            .expect("append user")
            .expect("exists");
        let updated = repo
            .append_message(created.id, Message::bot("Goodbye!", IntentName::Goodbye, now))
            .await
            .expect("append bot")
            .expect("exists");

        let contents: Vec<&str> =
            updated.messages.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents[2..], ["thanks", "Goodbye!"]);
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_is_none() {
        let repo = setup().await;
        let result = repo
            .append_message(ConversationId(77), Message::bot("x", IntentName::Help, Utc::now()))
            .await
            .expect("append");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn deactivated_conversations_leave_active_list() {
        let repo = setup().await;
        let first = repo.create(opening_turn()).await.expect("create");
        repo.create(opening_turn()).await.expect("create");

        repo.set_active(first.id, false).await.expect("deactivate").expect("exists");

        assert_eq!(repo.list_active().await.expect("active").len(), 1);
        assert_eq!(repo.list_all().await.expect("all").len(), 2);
    }
}
