//! Test model runners shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use textpool_core::{ModelConfig, ModelError, ModelRunner};

/// Loads unless the model path's file name is `broken`. Behavior of `run`
/// is driven by the input text:
///
/// - `panic` panics
/// - `nil` returns no result
/// - `error` fails with an invocation error
/// - `sleep:<ms>` sleeps, then echoes
/// - `gate:<key>` marks `key` as started, blocks until [`open_gate`] is
///   called for it, then echoes
/// - anything else echoes one record per word
pub struct ScriptedRunner {
    runs: usize,
}

#[derive(Debug, Serialize)]
pub struct Word {
    pub index: usize,
    pub word: String,
}

impl ModelRunner for ScriptedRunner {
    type Record = Word;

    fn load(config: &ModelConfig) -> Result<Self, ModelError> {
        if config.path().file_name().is_some_and(|n| n == "broken") {
            return Err(ModelError::Io {
                path: config.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such model"),
            });
        }
        Ok(Self { runs: 0 })
    }

    fn run(&mut self, text: &str) -> Result<Option<Vec<Word>>, ModelError> {
        self.runs += 1;
        match text {
            "panic" => panic!("scripted panic"),
            "nil" => return Ok(None),
            "error" => return Err(ModelError::Invocation("scripted failure".into())),
            _ => {}
        }

        if let Some(rest) = text.strip_prefix("gate:") {
            let (key, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            gates().pass(key);
            return Ok(Some(echo(tail)));
        }

        let text = match text.strip_prefix("sleep:") {
            Some(rest) => {
                let (ms, tail) = rest.split_once(' ').unwrap_or((rest, ""));
                std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
                tail
            }
            None => text,
        };

        Ok(Some(echo(text)))
    }
}

fn echo(text: &str) -> Vec<Word> {
    text.split_whitespace()
        .enumerate()
        .map(|(index, word)| Word {
            index,
            word: word.to_string(),
        })
        .collect()
}

/// Named gates shared by every test in the binary. `false` means a runner
/// is waiting at the gate, `true` means it is open.
struct Gates {
    state: Mutex<HashMap<String, bool>>,
    opened: Condvar,
}

fn gates() -> &'static Gates {
    static GATES: OnceLock<Gates> = OnceLock::new();
    GATES.get_or_init(|| Gates {
        state: Mutex::new(HashMap::new()),
        opened: Condvar::new(),
    })
}

impl Gates {
    fn pass(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.entry(key.to_string()).or_insert(false);
        while !state[key] {
            state = self.opened.wait(state).unwrap();
        }
    }
}

/// True once a runner has reached the gate (or it was opened).
pub fn gate_reached(key: &str) -> bool {
    gates().state.lock().unwrap().contains_key(key)
}

pub fn open_gate(key: &str) {
    gates().state.lock().unwrap().insert(key.to_string(), true);
    gates().opened.notify_all();
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn good_model() -> Arc<ModelConfig> {
    Arc::new(ModelConfig::new("models/good"))
}

pub fn broken_model() -> Arc<ModelConfig> {
    Arc::new(ModelConfig::new("models/broken"))
}

pub fn fixture_model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/extractor_model.toml")
}
