//! One request attempt: resolve, consult the cache, call the transport, transform,
//! write state and cache, then notify.

use super::OrchestratorInner;
use crate::context::{progress_reset, AbortSignal};
use crate::error::RequestError;
use crate::events::{ErrorEvent, EventBus, SuccessEvent};
use crate::key::KeyGenerator;
use crate::method::Method;
use crate::state::{FrontStates, StateAdapter, StatePatch};
use crate::transport::ProgressHandlers;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

impl<A: StateAdapter> OrchestratorInner<A> {
    pub(super) async fn send(
        self: Arc<Self>,
        args: Vec<Value>,
        method_override: Option<Method>,
        background: bool,
    ) -> Result<Value, RequestError> {
        let (source, config, front_states) = {
            let context = self.context.lock();
            let context = context.as_ref().ok_or(RequestError::NotEntered)?;
            (
                context.source.clone(),
                context.config.clone(),
                context.front_states.clone(),
            )
        };

        let method = method_override.unwrap_or_else(|| source.resolve(&args));
        let key = KeyGenerator::key(&method);
        let policy = self.services.cache.policy_for(&method);
        let hook_id = self.scope.hook_id;

        // Non-interactive adapters never tear down, so nothing would unbind
        if !background && self.adapter.is_interactive() {
            self.bind_states(&key, &front_states);
        }

        if !config.force.evaluate(&args) && policy.is_enabled() {
            if let Some(value) = self.services.cache.get(&key) {
                debug!(hook_id, key = %key, "Serving request from cache");
                self.apply_data(&key, value.clone(), background, &front_states);
                self.events().emit_success(&SuccessEvent {
                    data: value.clone(),
                    method,
                    send_args: args,
                    from_cache: true,
                });
                return Ok(value);
            }
        }

        let signal = AbortSignal::new();
        if let Some(context) = self.context.lock().as_mut() {
            context.abort = Some(signal.clone());
        }

        let started = if background {
            progress_reset().fetching(true)
        } else {
            progress_reset().loading(true)
        };
        self.patch_states(started, &front_states);

        let share = config
            .share_request
            .unwrap_or(self.services.defaults.share_request);
        let progress = self.progress_handlers(&front_states);
        let transport = Arc::clone(&self.services.transport);
        let outgoing = method.clone();
        let call = self
            .services
            .shared
            .join(&key, share, move || transport.send(&outgoing, progress));
        debug!(
            hook_id,
            key = %key,
            kind = %method.kind(),
            url = %method.url(),
            joined = call.joined,
            background,
            "Request dispatched"
        );
        signal.bind(call.abort);

        let response = tokio::select! {
            biased;
            _ = signal.aborted() => Err(RequestError::Aborted),
            result = call.response => result,
        };

        let outcome = match response {
            Ok(raw) => method.transform_response(raw).await,
            Err(err) => Err(err),
        };
        // A transform that finished after abort() is discarded
        let outcome = if signal.is_aborted() {
            Err(RequestError::Aborted)
        } else {
            outcome
        };

        if let Some(context) = self.context.lock().as_mut() {
            context.release_abort(&signal);
        }

        match outcome {
            Ok(value) => {
                self.services.cache.set(&key, value.clone(), &policy);
                self.apply_data(&key, value.clone(), background, &front_states);
                debug!(hook_id, key = %key, "Request resolved");
                self.events().emit_success(&SuccessEvent {
                    data: value.clone(),
                    method,
                    send_args: args,
                    from_cache: false,
                });
                Ok(value)
            }
            Err(error) => {
                let patch = StatePatch::new().error(Some(error.clone()));
                let patch = if background {
                    patch.fetching(false)
                } else {
                    patch.loading(false)
                };
                self.patch_states(patch, &front_states);
                debug!(hook_id, key = %key, error = %error, "Request rejected");
                self.events().emit_error(&ErrorEvent {
                    error: error.clone(),
                    method,
                    send_args: args,
                });
                Err(error)
            }
        }
    }

    /// Write a resolved value. Background fetches push it to every state bound to the key
    /// and only settle their own flags.
    fn apply_data(
        &self,
        key: &str,
        value: Value,
        background: bool,
        states: &FrontStates<A::Handle>,
    ) {
        if background {
            for binding in self.services.registry.bindings_for(key) {
                (binding.write)(StatePatch::new().data(value.clone()));
            }
            self.patch_states(StatePatch::new().fetching(false).error(None), states);
        } else {
            self.patch_states(
                StatePatch::new().data(value).loading(false).error(None),
                states,
            );
        }
    }

    /// Handlers registered on the active context at resolution time
    fn events(&self) -> EventBus {
        self.context
            .lock()
            .as_ref()
            .map(|context| context.events.clone())
            .unwrap_or_default()
    }

    fn progress_handlers(&self, states: &FrontStates<A::Handle>) -> ProgressHandlers {
        let download = (
            Arc::clone(&self.adapter),
            states.clone(),
            self.scope.clone(),
        );
        let upload = download.clone();
        ProgressHandlers {
            on_download: Arc::new(move |progress| {
                let (adapter, states, scope) = &download;
                adapter.update(&StatePatch::new().downloading(progress), states, scope);
            }),
            on_upload: Arc::new(move |progress| {
                let (adapter, states, scope) = &upload;
                adapter.update(&StatePatch::new().uploading(progress), states, scope);
            }),
        }
    }
}
