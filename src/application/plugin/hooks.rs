use std::{
    error::Error as StdError,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tracing::{debug, info, warn};

pub type HookFn = Box<dyn Fn() -> Result<(), Box<dyn StdError + Send + Sync>> + Send + Sync>;

/// Host lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Once per process start, before any document is shown.
    Startup,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Startup => "startup",
        }
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{hook} hook `{name}` failed: {source}")]
    Failed {
        hook: &'static str,
        name: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

struct RegisteredHook {
    hook: Hook,
    name: String,
    run: HookFn,
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<RegisteredHook>,
    startup_fired: AtomicBool,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, hook: Hook, name: impl Into<String>, run: F)
    where
        F: Fn() -> Result<(), Box<dyn StdError + Send + Sync>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(
            target = "fencerun::hooks",
            hook = hook.as_str(),
            name = %name,
            "Registered hook"
        );
        self.hooks.push(RegisteredHook {
            hook,
            name,
            run: Box::new(run),
        });
    }

    pub fn names(&self, hook: Hook) -> Vec<&str> {
        self.hooks
            .iter()
            .filter(|registered| registered.hook == hook)
            .map(|registered| registered.name.as_str())
            .collect()
    }

    /// Run the hooks registered for `hook` in registration order, stopping at
    /// the first failure. [`Hook::Startup`] only fires on the first call.
    pub fn fire(&self, hook: Hook) -> Result<(), HookError> {
        if hook == Hook::Startup && self.startup_fired.swap(true, Ordering::SeqCst) {
            debug!(
                target = "fencerun::hooks",
                hook = hook.as_str(),
                "Startup hooks already fired"
            );
            return Ok(());
        }

        for registered in self.hooks.iter().filter(|registered| registered.hook == hook) {
            if let Err(source) = (registered.run)() {
                warn!(
                    target = "fencerun::hooks",
                    hook = hook.as_str(),
                    name = %registered.name,
                    error = %source,
                    "Hook failed"
                );
                return Err(HookError::Failed {
                    hook: hook.as_str(),
                    name: registered.name.clone(),
                    source,
                });
            }
            info!(
                target = "fencerun::hooks",
                hook = hook.as_str(),
                name = %registered.name,
                result = "ok",
                "Hook completed"
            );
        }
        Ok(())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field(
                "hooks",
                &self
                    .hooks
                    .iter()
                    .map(|registered| (registered.hook, registered.name.as_str()))
                    .collect::<Vec<_>>(),
            )
            .field("startup_fired", &self.startup_fired.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[test]
    fn startup_hooks_fire_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut hooks = HookRegistry::new();
        hooks.register(
            Hook::Startup,
            "count",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        hooks.fire(Hook::Startup).expect("first");
        hooks.fire(Hook::Startup).expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.names(Hook::Startup), vec!["count"]);
    }

    #[test]
    fn failures_name_the_hook() {
        let mut hooks = HookRegistry::new();
        hooks.register(
            Hook::Startup,
            "broken",
            || Err(io::Error::other("disk full").into()),
        );

        let err = hooks.fire(Hook::Startup).expect_err("hook fails");
        assert_eq!(err.to_string(), "startup hook `broken` failed: disk full");
    }
}
