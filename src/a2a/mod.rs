//! Durable task engine behind the A2A surface. `A2aEngine` owns the task
//! store and the model-card repository; it drives a task through the
//! gateway core exactly like any other surface drives a chat completion,
//! the difference being that every step along the way — submission,
//! dispatch, completion — is a durable, CAS-guarded row update rather than
//! an in-memory struct passed down a call stack.

pub mod model_card;
pub mod store;
pub mod task;

pub use model_card::{ModelCard, ModelCardRepository, ModelCardStatus};
pub use store::TaskStore;
pub use task::{Artifact, Task, TaskEvent, TaskMessage, TaskStatus};

use crate::config::Config;
use crate::error::AppError;
use crate::gateway::{Gateway, RequestContext};
use crate::models::openai::{ChatCompletionRequest, ChatMessage, MessageContent};
use futures::stream::Stream;
use tokio::sync::mpsc;

pub struct A2aEngine {
    store: TaskStore,
    model_cards: ModelCardRepository,
}

impl A2aEngine {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { store: TaskStore::new(pool.clone()), model_cards: ModelCardRepository::new(pool) }
    }

    pub fn model_cards(&self) -> &ModelCardRepository {
        &self.model_cards
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, AppError> {
        self.store.get(task_id).await?.ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))
    }

    /// `cancel` is valid only from `submitted`, `working`, or
    /// `input_required`; the store's compare-and-set rejects any other
    /// starting state with `409` automatically, so this just tries the
    /// transition from whichever status the caller last observed.
    pub async fn cancel(&self, task_id: &str) -> Result<Task, AppError> {
        let task = self.get(task_id).await?;
        if task.status.is_terminal() {
            return Err(AppError::Conflict(format!("task {} is already in a terminal state", task_id)));
        }
        self.store.transition(task_id, task.status, TaskStatus::Canceled, None).await
    }

    /// Synchronously drives `submitted -> working -> {completed|failed}`
    /// through the gateway core, as specified for `send`. The returned task
    /// is already in its terminal state.
    pub async fn send(&self, gateway: &Gateway, config: &Config, ctx: &RequestContext, model: &str, session_id: &str, message: TaskMessage) -> Result<Task, AppError> {
        let task = self.store.create(session_id, message, Some(ctx.tenant.clone()), None).await?;
        self.drive(gateway, config, ctx, model, task).await
    }

    /// Same drive as `send`, but emits a `TaskEvent` over the returned
    /// stream at each durable step instead of only returning the final row.
    /// Every event is written to the store before it is sent down the
    /// channel, so a subscriber never observes a state the store doesn't
    /// already have durably.
    pub fn send_subscribe(
        &self,
        gateway: std::sync::Arc<Gateway>,
        config: Config,
        ctx: RequestContext,
        model: String,
        session_id: String,
        message: TaskMessage,
        store: std::sync::Arc<TaskStore>,
    ) -> impl Stream<Item = TaskEvent> {
        let (tx, rx) = mpsc::channel::<TaskEvent>(32);

        tokio::spawn(async move {
            let task = match store.create(&session_id, message, Some(ctx.tenant.clone()), None).await {
                Ok(task) => task,
                Err(e) => {
                    let _ = tx.send(TaskEvent::failed("unknown", e.to_string())).await;
                    return;
                }
            };

            let working = match store.transition(&task.id, TaskStatus::Submitted, TaskStatus::Working, None).await {
                Ok(t) => t,
                Err(e) => {
                    let _ = tx.send(TaskEvent::failed(&task.id, e.to_string())).await;
                    return;
                }
            };
            let _ = tx.send(TaskEvent::status(&working.id, TaskStatus::Working)).await;

            let request = build_request(&model, &working.message);
            match gateway.dispatch(&config, &ctx, &request).await {
                Ok(response) => {
                    let text = response.choices.first().map(|c| c.message.content.extract_text()).unwrap_or_default();
                    let artifact = Artifact { name: "response".to_string(), content: serde_json::json!({ "text": text }) };
                    if store.append_artifact(&working.id, &artifact).await.is_ok() {
                        let _ = tx.send(TaskEvent::artifact(&working.id, artifact)).await;
                    }
                    if !text.is_empty() {
                        let _ = tx.send(TaskEvent::message(&working.id, text)).await;
                    }
                    match store.transition(&working.id, TaskStatus::Working, TaskStatus::Completed, None).await {
                        Ok(_) => {
                            let _ = tx.send(TaskEvent::completed(&working.id)).await;
                        }
                        Err(e) => {
                            let _ = tx.send(TaskEvent::failed(&working.id, e.to_string())).await;
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = store.transition(&working.id, TaskStatus::Working, TaskStatus::Failed, Some(message.clone())).await;
                    let _ = tx.send(TaskEvent::failed(&working.id, message)).await;
                }
            }
        });

        futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) })
    }

    async fn drive(&self, gateway: &Gateway, config: &Config, ctx: &RequestContext, model: &str, task: Task) -> Result<Task, AppError> {
        let working = self.store.transition(&task.id, TaskStatus::Submitted, TaskStatus::Working, None).await?;
        let request = build_request(model, &working.message);

        match gateway.dispatch(config, ctx, &request).await {
            Ok(response) => {
                let text = response.choices.first().map(|c| c.message.content.extract_text()).unwrap_or_default();
                let artifact = Artifact { name: "response".to_string(), content: serde_json::json!({ "text": text }) };
                self.store.append_artifact(&working.id, &artifact).await?;
                self.store.transition(&working.id, TaskStatus::Working, TaskStatus::Completed, None).await
            }
            Err(e) => {
                let message = e.to_string();
                self.store.transition(&working.id, TaskStatus::Working, TaskStatus::Failed, Some(message)).await
            }
        }
    }
}

fn build_request(model: &str, message: &TaskMessage) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: message.role.clone(),
            content: MessageContent::Text(message.content.clone()),
            name: None,
            tool_calls: None,
        }],
        max_tokens: None,
        temperature: None,
        top_p: None,
        n: None,
        stream: Some(false),
        stop: None,
        presence_penalty: None,
        frequency_penalty: None,
        user: None,
        tools: None,
        tool_choice: None,
        response_format: None,
        seed: None,
        logprobs: None,
        top_logprobs: None,
        logit_bias: None,
        service_tier: None,
    }
}
