use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use crate::{DecodeError, Decoder, Sentence, Translation};

// ---------------------------------------------------------------------------
// Work / Result types
// ---------------------------------------------------------------------------

struct DecodeWork {
    index: usize,
    sentence: Sentence,
}

struct DecodeResult {
    index: usize,
    result: Result<Translation, DecodeError>,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

pub(crate) fn decode_batch(
    decoder: &Arc<Decoder>,
    sentences: Vec<Sentence>,
    threads: usize,
) -> Vec<Result<Translation, DecodeError>> {
    let total = sentences.len();
    let ids: Vec<usize> = sentences.iter().map(Sentence::id).collect();
    let threads = threads.clamp(1, total.max(1));

    let (work_tx, work_rx) = mpsc::channel::<DecodeWork>();
    let (result_tx, result_rx) = mpsc::channel::<DecodeResult>();
    let work_rx = Arc::new(Mutex::new(work_rx));

    let mut spawned = 0;
    for n in 0..threads {
        let decoder = Arc::clone(decoder);
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("hgd-decode-{n}"))
            .spawn(move || decode_worker(&decoder, &work_rx, &result_tx));
        match handle {
            Ok(_) => spawned += 1,
            Err(e) => {
                warn!(worker = n, error = %e, "failed to spawn decode worker");
                break;
            }
        }
    }
    drop(result_tx);

    if spawned == 0 {
        debug!(total, "decoding batch on the calling thread");
        return sentences.iter().map(|s| decoder.decode(s)).collect();
    }
    debug!(total, workers = spawned, "decoding batch");

    for (index, sentence) in sentences.into_iter().enumerate() {
        let _ = work_tx.send(DecodeWork { index, sentence });
    }
    drop(work_tx);

    let mut results: Vec<Option<Result<Translation, DecodeError>>> =
        (0..total).map(|_| None).collect();
    for DecodeResult { index, result } in result_rx {
        if let Some(slot) = results.get_mut(index) {
            *slot = Some(result);
        }
    }
    results
        .into_iter()
        .zip(ids)
        .map(|(r, id)| r.unwrap_or(Err(DecodeError::WorkerLost(id))))
        .collect()
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn decode_worker(
    decoder: &Decoder,
    work_rx: &Mutex<mpsc::Receiver<DecodeWork>>,
    result_tx: &mpsc::Sender<DecodeResult>,
) {
    loop {
        let work = {
            let Ok(rx) = work_rx.lock() else { return };
            match rx.recv() {
                Ok(w) => w,
                Err(_) => return,
            }
        };
        let result = decoder.decode(&work.sentence);
        if result_tx
            .send(DecodeResult {
                index: work.index,
                result,
            })
            .is_err()
        {
            return;
        }
    }
}
