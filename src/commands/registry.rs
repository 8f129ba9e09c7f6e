//! Handler registry
//!
//! Maps verbs to handlers plus their dispatch metadata. Sub-commands of a
//! generic verb (`SITE BLST`, `OPTS UTF8`) live in a second table keyed by
//! base verb and extension name and take precedence over the base verb.

use std::collections::HashMap;
use std::sync::Arc;

use crate::commands::handler::CommandHandler;
use crate::protocol::Command;

#[derive(Clone)]
pub struct HandlerRegistration {
    verb: String,
    login_required: bool,
    abortable: bool,
    handler: Arc<dyn CommandHandler>,
}

impl HandlerRegistration {
    /// Registers `handler` for `verb`. Login is required unless
    /// [`public`](Self::public) is called.
    pub fn new(verb: &str, handler: impl CommandHandler + 'static) -> Self {
        Self {
            verb: verb.to_ascii_uppercase(),
            login_required: true,
            abortable: false,
            handler: Arc::new(handler),
        }
    }

    /// Usable before login.
    pub fn public(mut self) -> Self {
        self.login_required = false;
        self
    }

    /// Runs in the background and can be cancelled by ABOR.
    pub fn abortable(mut self) -> Self {
        self.abortable = true;
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn is_login_required(&self) -> bool {
        self.login_required
    }

    pub fn is_abortable(&self) -> bool {
        self.abortable
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }
}

#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<String, HandlerRegistration>,
    extensions: HashMap<(String, String), HandlerRegistration>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: HandlerRegistration) -> &mut Self {
        self.handlers.insert(registration.verb.clone(), registration);
        self
    }

    /// Registers `registration` as a sub-command of `base`, named by its verb.
    pub fn register_extension(
        &mut self,
        base: &str,
        registration: HandlerRegistration,
    ) -> &mut Self {
        let key = (base.to_ascii_uppercase(), registration.verb.clone());
        self.extensions.insert(key, registration);
        self
    }

    pub fn resolve(&self, command: &Command) -> Option<&HandlerRegistration> {
        if let Some((name, _)) = command.extension() {
            let key = (command.verb().to_string(), name);
            if let Some(registration) = self.extensions.get(&key) {
                return Some(registration);
            }
        }
        self.handlers.get(command.verb())
    }

    /// Extension names registered under `base`, sorted.
    pub fn extensions_of(&self, base: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .extensions
            .keys()
            .filter(|(b, _)| b.eq_ignore_ascii_case(base))
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
