//! One natural-language query round trip, folded into the chat log.

use crate::error::ClientError;
use crate::model::{ChatMessage, Domain, MessageMeta, QueryResult};
use crate::state::ViewState;
use futures::future::BoxFuture;

pub const CLARIFICATION_PREFIX: &str = "I need more info: ";

/// Request/response query backend.
pub trait QueryRpc: Send + Sync {
    fn query<'a>(
        &'a self,
        text: &'a str,
        domain: Domain,
    ) -> BoxFuture<'a, Result<QueryResult, ClientError>>;
}

#[derive(Debug)]
pub enum QueryOutcome {
    /// Blank input, or a query already in flight. Nothing was sent.
    Skipped,
    Answered { rows: usize },
    Clarification,
    Failed(ClientError),
}

impl QueryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed(_))
    }
}

/// The assistant message a result turns into.
pub fn assistant_reply(result: &QueryResult, domain: Domain) -> ChatMessage {
    if result.clarification_needed {
        return ChatMessage::assistant(format!(
            "{CLARIFICATION_PREFIX}{}",
            result.clarification_questions.join(" ")
        ));
    }
    ChatMessage {
        meta: Some(MessageMeta::Query {
            sql: result.sql.clone(),
        }),
        ..ChatMessage::assistant(format!("Here is what I found in {domain}."))
    }
}

/// Submit `text`, wait for the backend and apply the answer to `state`.
pub async fn run_query<R>(rpc: &R, state: &mut ViewState, text: &str, domain: Domain) -> QueryOutcome
where
    R: QueryRpc + ?Sized,
{
    let Some(text) = state.submit_query(text) else {
        return QueryOutcome::Skipped;
    };
    tracing::debug!(%domain, "submitting query");
    let result = rpc.query(&text, domain).await;
    state.complete_query(domain, result)
}
