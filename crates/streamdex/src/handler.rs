//! 🎬 The Handler: one batch in, one bulk reply out.
//!
//! 🎬 COLD OPEN - INT. THE INVOCATION - t = 0
//!
//! A batch of change records walks in. Here is the whole evening, in order:
//!
//! ```text
//!   before hook ─▶ shape check ─▶ assemble every record ─▶ submit (or short-circuit)
//!        │              │                  │                        │
//!        └──────────────┴──────── any error ─────────────────────── ┴──▶ error hook
//!                                                                   │
//!                                                              after hook ─▶ result
//! ```
//!
//! The handler is immutable once built. Share it behind an `Arc`, call `handle` from as
//! many tasks as you like; every invocation owns its own batch and nothing else.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::assembler::{RecordErrorPolicy, assemble_batch};
use crate::backends::BulkClient;
use crate::common::{InvocationContext, StreamEvent};
use crate::config::HandlerConfig;
use crate::hooks::{
    AfterHook, BeforeHook, ErrorHook, Hooks, IdResolver, RecordErrorHook, Resolvers, TransformRecordHook,
    VersionResolver,
};
use crate::submission::{empty_result, submit};

/// 🎬 Turns change-stream batches into bulk requests against one client.
#[derive(Debug)]
pub struct Handler<C> {
    config: HandlerConfig,
    client: C,
    resolvers: Resolvers,
    hooks: Hooks,
}

/// 🏗️ Collects the code-only parts of a handler: resolvers and lifecycle hooks.
#[derive(Debug)]
pub struct HandlerBuilder<C> {
    config: HandlerConfig,
    client: C,
    resolvers: Resolvers,
    hooks: Hooks,
}

impl<C: BulkClient> Handler<C> {
    /// 🚀 A handler with no resolvers and no hooks. Fails on an invalid config.
    pub fn new(config: HandlerConfig, client: C) -> Result<Self> {
        Self::builder(config, client).build()
    }

    pub fn builder(config: HandlerConfig, client: C) -> HandlerBuilder<C> {
        HandlerBuilder {
            config,
            client,
            resolvers: Resolvers::default(),
            hooks: Hooks::default(),
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// 📬 Process one batch.
    ///
    /// Returns the client's reply, the after hook's replacement, the empty-batch reply,
    /// or the error hook's value. Without an error hook, failures come back as `Err`.
    pub async fn handle(&self, event: Value, ctx: &InvocationContext) -> Result<Value> {
        match self.process(&event, ctx).await {
            Ok(result) => Ok(result),
            Err(err) => match &self.hooks.error {
                Some(hook) => {
                    debug!(error = %format!("{err:#}"), "🚑 Handing the failure to the error hook");
                    hook.on_error(&event, ctx, err).await
                }
                None => Err(err),
            },
        }
    }

    /// 📬 Process a batch that already arrived as the runtime's typed event.
    ///
    /// Hooks still see it as plain JSON, same as with `handle`.
    pub async fn handle_stream_event(
        &self,
        event: aws_lambda_events::event::dynamodb::Event,
        ctx: &InvocationContext,
    ) -> Result<Value> {
        let event = serde_json::to_value(&event)
            .context("💀 The typed stream event refused to turn back into JSON")?;
        self.handle(event, ctx).await
    }

    async fn process(&self, event: &Value, ctx: &InvocationContext) -> Result<Value> {
        if let Some(hook) = &self.hooks.before {
            hook.before(event, ctx)
                .await
                .context("💀 The before hook vetoed the batch before a single record was read")?;
        }

        let parsed = StreamEvent::from_value(event)?;
        info!(
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
            records = parsed.records.len(),
            "📬 Change batch received"
        );

        let policy = RecordErrorPolicy::from_hook(self.hooks.record_error.as_deref());
        let batch = assemble_batch(event, &parsed, ctx, &self.config, &self.resolvers, policy).await?;

        let result = if batch.actions.is_empty() {
            debug!("🕳️ Nothing to send, skipping the bulk call entirely");
            empty_result()
        } else {
            submit(&self.client, &self.config.bulk, &batch.actions, &self.config.retry).await?
        };

        match &self.hooks.after {
            Some(hook) => {
                let replacement = hook
                    .after(event, ctx, &result, &batch.meta)
                    .await
                    .context("💀 The after hook tripped on the finish line")?;
                Ok(replacement.unwrap_or(result))
            }
            None => Ok(result),
        }
    }
}

impl<C: BulkClient> HandlerBuilder<C> {
    /// 🆔 Any `IdResolver`: an async impl, or a plain `Fn(&Document, &Document) -> Result<String>`.
    pub fn id_resolver(mut self, resolver: impl IdResolver + 'static) -> Self {
        self.resolvers.id = Some(Arc::new(resolver));
        self
    }

    pub fn version_resolver(mut self, resolver: impl VersionResolver + 'static) -> Self {
        self.resolvers.version = Some(Arc::new(resolver));
        self
    }

    pub fn transform_record(mut self, transform: impl TransformRecordHook + 'static) -> Self {
        self.resolvers.transform = Some(Arc::new(transform));
        self
    }

    pub fn before_hook(mut self, hook: impl BeforeHook + 'static) -> Self {
        self.hooks.before = Some(Arc::new(hook));
        self
    }

    pub fn after_hook(mut self, hook: impl AfterHook + 'static) -> Self {
        self.hooks.after = Some(Arc::new(hook));
        self
    }

    pub fn error_hook(mut self, hook: impl ErrorHook + 'static) -> Self {
        self.hooks.error = Some(Arc::new(hook));
        self
    }

    pub fn record_error_hook(mut self, hook: impl RecordErrorHook + 'static) -> Self {
        self.hooks.record_error = Some(Arc::new(hook));
        self
    }

    /// 🔒 Validate the config and freeze everything.
    pub fn build(self) -> Result<Handler<C>> {
        self.config
            .validate()
            .context("💀 The handler config didn't survive validation")?;
        debug!(resolvers = ?self.resolvers, hooks = ?self.hooks, "🏗️ Handler built");
        Ok(Handler {
            config: self.config,
            client: self.client,
            resolvers: self.resolvers,
            hooks: self.hooks,
        })
    }
}
