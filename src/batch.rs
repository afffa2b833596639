use crate::error::{BoxError, Error};

use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;

/// Split `keys` into the batches a multi key fetch works through.
///
/// With `n = keys.len() / batch_size` this yields `n` batches of `keys.len() / n` keys each, followed by one
/// batch of whatever is left over. Fewer than `batch_size` keys make a single batch.
///
/// # Panics
/// If `batch_size` is zero
pub fn partition<T>(keys: &[T], batch_size: usize) -> Vec<&[T]> {
    assert!(batch_size > 0, "batch size must be greater than 0");

    if keys.is_empty() {
        return Vec::new();
    }

    let n = keys.len() / batch_size;
    if n == 0 {
        return vec![keys];
    }

    let size = keys.len() / n;
    let mut batches = Vec::with_capacity(n + 1);

    for i in 0..n {
        batches.push(&keys[i * size..(i + 1) * size]);
    }

    let rest = &keys[n * size..];
    if !rest.is_empty() {
        batches.push(rest);
    }

    batches
}

/// Fetch every batch of `keys`, running at most `max_concurrency` fetches at a time.
///
/// Batches that succeed are merged into the returned map even when another batch fails,
/// the error returned is the first one seen. Failing batches don't cancel the others.
pub(crate) async fn fetch_batches<V, F, Fut, E>(
    keys: &[String],
    batch_size: usize,
    max_concurrency: usize,
    fetch: &F,
) -> (HashMap<String, V>, Option<Error>)
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<HashMap<String, V>, E>>,
    E: Into<BoxError>,
{
    let merged = Mutex::new(HashMap::with_capacity(keys.len()));
    let first_error = Mutex::new(None);

    let batches = partition(keys, batch_size);
    tracing::debug!(keys = keys.len(), batches = batches.len(), "fetching batches");

    stream::iter(batches)
        .for_each_concurrent(max_concurrency, |batch| {
            let merged = &merged;
            let first_error = &first_error;

            async move {
                match fetch(batch.to_vec()).await {
                    Ok(found) => merged.lock().extend(found),
                    Err(err) => {
                        let err: BoxError = err.into();
                        tracing::warn!(batch = batch.len(), error = %err, "batch fetch failed");

                        first_error.lock().get_or_insert(Error::fetch(err));
                    }
                }
            }
        })
        .await;

    (merged.into_inner(), first_error.into_inner())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    fn sizes(batches: &[&[String]]) -> Vec<usize> {
        batches.iter().map(|b| b.len()).collect()
    }

    #[test]
    fn test_partition_even() {
        let keys = numbered(4000);

        assert_eq!(sizes(&partition(&keys, 1000)), vec![1000; 4]);
    }

    #[test]
    fn test_partition_spreads_overflow_across_batches() {
        let keys = numbered(2500);

        // two batches, each bigger than the batch size
        assert_eq!(sizes(&partition(&keys, 1000)), vec![1250, 1250]);
    }

    #[test]
    fn test_partition_keeps_remainder() {
        let keys = numbered(2999);

        assert_eq!(sizes(&partition(&keys, 1000)), vec![1499, 1499, 1]);

        let keys = numbered(10);
        assert_eq!(sizes(&partition(&keys, 3)), vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_partition_small_input_is_one_batch() {
        let keys = numbered(5);

        assert_eq!(sizes(&partition(&keys, 1000)), vec![5]);
        assert!(partition::<String>(&[], 1000).is_empty());
    }

    #[test]
    fn test_partition_preserves_order() {
        let keys = numbered(10);

        let flat: Vec<&String> = partition(&keys, 3).into_iter().flatten().collect();

        assert_eq!(flat, keys.iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fetch_batches_merges_every_batch() {
        let keys = numbered(100);
        let calls = AtomicUsize::new(0);

        let fetch = |batch: Vec<String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, BoxError>(batch.into_iter().map(|k| (k.clone(), k)).collect::<HashMap<_, _>>())
            }
        };

        let (found, error) = fetch_batches(&keys, 10, 3, &fetch).await;

        assert!(error.is_none());
        assert_eq!(found.len(), 100);
        assert_eq!(found.get("42").map(String::as_str), Some("42"));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_fetch_batches_keeps_partial_results() {
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];

        let fetch = |batch: Vec<String>| async move {
            if batch.contains(&"c".to_string()) {
                return Err(BoxError::from("backend down"));
            }

            Ok(batch.into_iter().map(|k| (k, 1)).collect::<HashMap<_, _>>())
        };

        let (found, error) = fetch_batches(&keys, 2, 10, &fetch).await;

        assert!(matches!(error, Some(Error::Fetch(_))));
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("a"));
        assert!(found.contains_key("b"));
    }

    #[tokio::test]
    async fn test_fetch_batches_respects_concurrency() {
        let keys = numbered(100);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let fetch = |batch: Vec<String>| {
            let running = &running;
            let peak = &peak;

            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                tokio::time::sleep(Duration::from_millis(5)).await;

                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BoxError>(batch.into_iter().map(|k| (k, ())).collect::<HashMap<_, _>>())
            }
        };

        let (found, error) = fetch_batches(&keys, 1, 10, &fetch).await;

        assert!(error.is_none());
        assert_eq!(found.len(), 100);

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 10, "peak concurrency was {peak}");
        assert!(peak > 1, "batches never overlapped");
    }
}
