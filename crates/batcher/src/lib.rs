//! Generic batch-call-then-retry-then-fallback discipline shared by every
//! per-game agent stage (§4.8). Guarantees `|output| == |input|`.

use domain::{Error, Game, GameInsight, Pick, Prediction};
use std::collections::HashMap;
use std::future::Future;
use tracing::warn;

pub const BATCH_SIZE: usize = 5;
pub const MAX_RETRIES: usize = 2;

/// Anything addressable by `game_id`, so the batcher can reconcile a
/// stage's partial output against its full input set.
pub trait GameKeyed {
    fn game_id(&self) -> &str;
}

impl GameKeyed for Game {
    fn game_id(&self) -> &str {
        &self.id
    }
}

impl GameKeyed for GameInsight {
    fn game_id(&self) -> &str {
        &self.game_id
    }
}

impl GameKeyed for Prediction {
    fn game_id(&self) -> &str {
        &self.game_id
    }
}

impl GameKeyed for Pick {
    fn game_id(&self) -> &str {
        &self.game_id
    }
}

/// Runs `call` over `items` in chunks of `batch_size`, retrying an
/// empty/invalid response up to `max_retries` times, then synthesizing a
/// fallback record (via `synth_fallback`) for every input game the agent
/// never produced. Batches are processed sequentially (§5).
pub async fn run_batches<T, O, F, Fut, S>(items: &[T], batch_size: usize, max_retries: usize, call: F, synth_fallback: S) -> Vec<O>
where
    T: GameKeyed + Clone,
    O: GameKeyed + Clone,
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<O>, Error>>,
    S: Fn(&T) -> O,
{
    let mut produced: HashMap<String, O> = HashMap::new();

    for batch in items.chunks(batch_size.max(1)) {
        let mut attempt = 0usize;
        loop {
            let result = call(batch.to_vec()).await;
            match result {
                Ok(records) if !records.is_empty() => {
                    for record in records {
                        produced.insert(record.game_id().to_string(), record);
                    }
                    break;
                }
                Ok(_) => {
                    if attempt >= max_retries {
                        warn!("batch of {} games produced no records after {attempt} retries", batch.len());
                        break;
                    }
                    attempt += 1;
                    warn!("batch returned empty result, retry {attempt}/{max_retries}");
                }
                Err(e) => {
                    if attempt >= max_retries {
                        warn!("batch of {} games failed after {attempt} retries: {e}", batch.len());
                        break;
                    }
                    attempt += 1;
                    warn!("batch call errored ({e}), retry {attempt}/{max_retries}");
                }
            }
        }
    }

    items
        .iter()
        .map(|item| produced.get(item.game_id()).cloned().unwrap_or_else(|| synth_fallback(item)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Item(String);
    impl GameKeyed for Item {
        fn game_id(&self) -> &str {
            &self.0
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Output {
        id: String,
        fallback: bool,
    }
    impl GameKeyed for Output {
        fn game_id(&self) -> &str {
            &self.id
        }
    }

    #[tokio::test]
    async fn every_input_produces_an_output_even_when_one_batch_fails_forever() {
        let items: Vec<Item> = (0..12).map(|i| Item(format!("g{i}"))).collect();
        let attempts = Arc::new(AtomicUsize::new(0));

        let results = run_batches(
            &items,
            5,
            2,
            |batch: Vec<Item>| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if batch.iter().any(|i| i.0 == "g5") {
                        return Ok(Vec::new());
                    }
                    Ok(batch.into_iter().map(|i| Output { id: i.0, fallback: false }).collect())
                }
            },
            |item| Output { id: item.0.clone(), fallback: true },
        )
        .await;

        assert_eq!(results.len(), 12);
        let failed_batch_results: Vec<_> = results.iter().filter(|r| r.fallback).collect();
        assert_eq!(failed_batch_results.len(), 5);
        assert!(results.iter().all(|r| items.iter().any(|i| i.0 == r.id)));
    }

    #[tokio::test]
    async fn successful_batch_is_not_retried() {
        let items: Vec<Item> = (0..3).map(|i| Item(format!("g{i}"))).collect();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let results = run_batches(
            &items,
            5,
            2,
            move |batch: Vec<Item>| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async move { Ok(batch.into_iter().map(|i| Output { id: i.0, fallback: false }).collect()) }
            },
            |item| Output { id: item.0.clone(), fallback: true },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| !r.fallback));
    }
}
