use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use evdev::KeyCode;
use tokio::sync::oneshot;

use super::{
    target::{keymap, KeyboardOutput, ModifierKind, Modifiers},
    ActionError,
};

/// Longest uninterrupted wait inside a macro. Cancellation is checked
/// before every slice.
pub const SLICE: Duration = Duration::from_millis(10);

/// Outcome of a single macro execution
pub type MacroResult = Result<(), ActionError>;

/// Cooperative cancellation flag shared between a caller and a running
/// macro. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroStep {
    Press(KeyCode),
    Release(KeyCode),
    Tap(KeyCode),
    Delay(Duration),
    TypeText(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDefinition {
    pub name: String,
    pub steps: Vec<MacroStep>,
}

impl MacroDefinition {
    pub fn new(name: &str, steps: Vec<MacroStep>) -> Self {
        Self {
            name: name.to_string(),
            steps,
        }
    }
}

/// Handle to a running macro. Dropping the handle does not stop the macro.
#[derive(Debug)]
pub struct MacroHandle {
    name: String,
    token: CancellationToken,
    completion: oneshot::Receiver<MacroResult>,
}

impl MacroHandle {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The token controlling this execution
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the macro to finish and return its outcome
    pub async fn wait(self) -> MacroResult {
        match self.completion.await {
            Ok(result) => result,
            Err(_) => Err(ActionError::ExecutionFailed(format!(
                "macro '{}' stopped without reporting completion",
                self.name
            ))),
        }
    }
}

/// Registry of named macros which runs them as background tasks
#[derive(Debug)]
pub struct MacroScheduler {
    keyboard: Arc<dyn KeyboardOutput>,
    registry: Mutex<HashMap<String, Arc<MacroDefinition>>>,
    in_flight: Arc<Mutex<HashMap<u64, CancellationToken>>>,
    next_id: AtomicU64,
}

impl MacroScheduler {
    pub fn new(keyboard: Arc<dyn KeyboardOutput>) -> Self {
        Self {
            keyboard,
            registry: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register the given macro, replacing any macro with the same name
    pub fn register(&self, definition: MacroDefinition) {
        log::debug!("Registering macro '{}'", definition.name);
        let mut registry = lock(&self.registry);
        registry.insert(definition.name.clone(), Arc::new(definition));
    }

    /// Remove the macro with the given name. Executions already running
    /// are not affected.
    pub fn unregister(&self, name: &str) -> Option<MacroDefinition> {
        let mut registry = lock(&self.registry);
        registry
            .remove(name)
            .map(|definition| definition.as_ref().clone())
    }

    /// Replace the whole registry with the given macros
    pub fn replace_all(&self, definitions: impl IntoIterator<Item = MacroDefinition>) {
        let mut registry = lock(&self.registry);
        registry.clear();
        for definition in definitions {
            registry.insert(definition.name.clone(), Arc::new(definition));
        }
        log::debug!("Macro registry now holds {} macros", registry.len());
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.registry).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.registry).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of executions that have not finished yet
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Cancel every running execution
    pub fn cancel_all(&self) {
        let in_flight = lock(&self.in_flight);
        for token in in_flight.values() {
            token.cancel();
        }
    }

    /// Start the named macro in the background. The given token is shared
    /// with the execution, otherwise a new one is created; either way it is
    /// available from the returned handle. Must be called from within a
    /// tokio runtime.
    pub fn execute(
        &self,
        name: &str,
        token: Option<&CancellationToken>,
    ) -> Result<MacroHandle, ActionError> {
        let Some(definition) = lock(&self.registry).get(name).cloned() else {
            return Err(ActionError::MacroNotFound(name.to_string()));
        };
        let token = token.cloned().unwrap_or_default();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.in_flight).insert(id, token.clone());

        let (tx, rx) = oneshot::channel();
        let keyboard = self.keyboard.clone();
        let in_flight = self.in_flight.clone();
        let task_token = token.clone();
        log::debug!("Starting macro '{name}'");
        tokio::task::spawn(async move {
            let result = run_steps(keyboard.as_ref(), definition.as_ref(), &task_token).await;
            lock(&in_flight).remove(&id);
            // The handle may have been dropped
            let _ = tx.send(result);
        });

        Ok(MacroHandle {
            name: name.to_string(),
            token,
            completion: rx,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Perform each step in order. Keys pressed by the macro and still down when
/// it stops early are released.
async fn run_steps(
    keyboard: &dyn KeyboardOutput,
    definition: &MacroDefinition,
    token: &CancellationToken,
) -> MacroResult {
    let mut held: Vec<KeyCode> = Vec::new();
    let result = perform_steps(keyboard, definition, token, &mut held).await;
    if result.is_err() {
        for key in held {
            if let Err(e) = keyboard.release_key(key, Modifiers::NONE) {
                log::warn!("Unable to release {key:?} after macro stopped: {e}");
            }
        }
    }
    result
}

async fn perform_steps(
    keyboard: &dyn KeyboardOutput,
    definition: &MacroDefinition,
    token: &CancellationToken,
    held: &mut Vec<KeyCode>,
) -> MacroResult {
    for step in definition.steps.iter() {
        if token.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        log::trace!("Macro '{}' step: {step:?}", definition.name);
        match step {
            MacroStep::Press(key) => {
                keyboard.press_key(*key, Modifiers::NONE)?;
                held.push(*key);
            }
            MacroStep::Release(key) => {
                keyboard.release_key(*key, Modifiers::NONE)?;
                held.retain(|k| k != key);
            }
            MacroStep::Tap(key) => keyboard.tap_key(*key, Modifiers::NONE)?,
            MacroStep::Delay(duration) => sleep_sliced(*duration, token).await?,
            MacroStep::TypeText(text) => type_text(keyboard, text, token).await?,
        }
    }

    Ok(())
}

async fn sleep_sliced(duration: Duration, token: &CancellationToken) -> MacroResult {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if token.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        let slice = remaining.min(SLICE);
        tokio::time::sleep(slice).await;
        remaining -= slice;
    }

    Ok(())
}

/// Type one character per slice
async fn type_text(
    keyboard: &dyn KeyboardOutput,
    text: &str,
    token: &CancellationToken,
) -> MacroResult {
    for (i, c) in text.chars().enumerate() {
        if i > 0 {
            tokio::time::sleep(SLICE).await;
        }
        if token.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        let Some((key, shift)) = keymap::key_for_char(c) else {
            log::debug!("No key for character {c:?}, skipping");
            continue;
        };
        let modifiers = if shift {
            Modifiers::NONE.with(ModifierKind::Shift)
        } else {
            Modifiers::NONE
        };
        keyboard.tap_key(key, modifiers)?;
    }

    Ok(())
}
