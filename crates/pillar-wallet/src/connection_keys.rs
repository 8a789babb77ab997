//! Connection key pair pre-generation.
//!
//! A batch covers `connections_count + pool_size` consecutive indices after
//! the last known one. The range is split into contiguous slices; each slice
//! is handed to a single-use worker together with the wallet secret and path
//! template, and the worker replies with its key pairs over a channel. Results
//! are merged and sorted by `connIndex`, so the output does not depend on
//! which worker finished first.
//!
//! If any worker fails the batch fails as a whole once every worker has
//! reported; partial batches are never returned.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pillar_core::constants::{
    DEFAULT_CONNECTION_KEY_TEMPLATE, DEFAULT_POOL_SIZE, DEFAULT_POOL_WORKERS,
    DEFAULT_PREGENERATION_THRESHOLD, HARDENED_OFFSET, Network,
};
use pillar_core::error::{DerivationError, PoolError};
use pillar_core::types::ConnectionKeyPair;

use crate::derivation::{KeyPathDeriver, PathTemplate};
use crate::seed::WalletSecret;

/// How a batch is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyGenStrategy {
    /// One blocking task per slice.
    #[default]
    Parallel,
    /// Every slice on the calling task.
    Synchronous,
}

impl KeyGenStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Synchronous => "synchronous",
        }
    }
}

impl fmt::Display for KeyGenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyGenStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" | "threads" => Ok(Self::Parallel),
            "synchronous" | "sync" | "inline" => Ok(Self::Synchronous),
            other => Err(format!("unknown key generation strategy: {other}")),
        }
    }
}

/// Pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of slices a batch is split into.
    pub workers: usize,
    /// Extra keys generated beyond the requested connections.
    pub pool_size: u32,
    /// Skip generation when more than this many keys are already known.
    pub pregeneration_threshold: usize,
    pub strategy: KeyGenStrategy,
    /// Path template with `{role}` and `{index}` slots.
    pub template: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_WORKERS,
            pool_size: DEFAULT_POOL_SIZE,
            pregeneration_threshold: DEFAULT_PREGENERATION_THRESHOLD,
            strategy: KeyGenStrategy::default(),
            template: DEFAULT_CONNECTION_KEY_TEMPLATE.to_string(),
        }
    }
}

/// A contiguous index range `[start, start + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSlice {
    pub start: u32,
    pub count: u32,
}

impl IndexSlice {
    /// One past the last index, `None` if that does not fit in a `u32`.
    pub fn end(&self) -> Option<u32> {
        self.start.checked_add(self.count)
    }
}

/// Split `[start, start + total)` into at most `workers` contiguous slices.
///
/// Each slice gets `total / workers` indices and the first `total % workers`
/// slices one more. Empty slices are omitted. Fails if the range does not
/// fit in a `u32`.
pub fn partition(start: u32, total: u32, workers: usize) -> Result<Vec<IndexSlice>, DerivationError> {
    if start.checked_add(total).is_none() {
        return Err(DerivationError::IndexOutOfRange {
            index: u64::from(start) + u64::from(total) - 1,
            kind: "normal",
        });
    }
    let workers = u32::try_from(workers.max(1)).unwrap_or(u32::MAX);
    let base = total / workers;
    let extra = total % workers;
    let mut slices = Vec::new();
    let mut next = start;
    for worker in 0..workers {
        let count = base + u32::from(worker < extra);
        if count == 0 {
            break;
        }
        slices.push(IndexSlice { start: next, count });
        // Bounded by the range check above.
        next = next.saturating_add(count);
    }
    Ok(slices)
}

/// First index of a batch continuing after `last_index` (negative = fresh start).
pub fn start_index(last_index: i64) -> Result<u32, DerivationError> {
    if last_index < 0 {
        return Ok(0);
    }
    let next = last_index.saturating_add(1);
    u32::try_from(next)
        .ok()
        .filter(|n| *n < HARDENED_OFFSET)
        .ok_or(DerivationError::IndexOutOfRange {
            index: next as u64,
            kind: "normal",
        })
}

/// Work order for one worker. Owned so it can be moved into the worker task.
#[derive(Debug, Clone)]
pub struct KeyPairJob {
    pub worker: usize,
    pub secret: WalletSecret,
    pub template: PathTemplate,
    pub slice: IndexSlice,
}

/// Derive every pair in `job.slice`.
pub fn derive_slice(job: &KeyPairJob) -> Result<Vec<ConnectionKeyPair>, PoolError> {
    let deriver = KeyPathDeriver::new();
    // Public keys do not depend on the network.
    let root = job.secret.root(&deriver, Network::default())?;
    let end = job.slice.end().ok_or(PoolError::WorkerFailed {
        worker: job.worker,
        source: DerivationError::IndexOutOfRange {
            index: u64::from(job.slice.start) + u64::from(job.slice.count) - 1,
            kind: "normal",
        },
    })?;
    (job.slice.start..end)
        .map(|index| -> Result<ConnectionKeyPair, DerivationError> {
            let (a, ad) = deriver.derive_role_pair(&root, &job.template, index)?;
            Ok(ConnectionKeyPair {
                a: a.public_key_hex(),
                ad: ad.public_key_hex(),
                conn_index: index,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| PoolError::WorkerFailed {
            worker: job.worker,
            source,
        })
}

/// Executes the jobs of one batch. Output order is unspecified.
#[async_trait]
pub trait KeyPairGenerator: Send + Sync {
    async fn generate(&self, jobs: Vec<KeyPairJob>) -> Result<Vec<ConnectionKeyPair>, PoolError>;

    fn name(&self) -> &'static str;
}

struct WorkerReply {
    worker: usize,
    result: Result<Vec<ConnectionKeyPair>, PoolError>,
}

/// Work a single worker performs for its job.
pub type SliceWorker = fn(&KeyPairJob) -> Result<Vec<ConnectionKeyPair>, PoolError>;

/// Runs each job on its own blocking task.
#[derive(Debug, Clone, Copy)]
pub struct ThreadPoolGenerator {
    worker: SliceWorker,
}

impl ThreadPoolGenerator {
    pub fn new() -> Self {
        Self::with_worker(derive_slice)
    }

    /// Run `worker` for every job instead of [`derive_slice`].
    pub fn with_worker(worker: SliceWorker) -> Self {
        Self { worker }
    }
}

impl Default for ThreadPoolGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyPairGenerator for ThreadPoolGenerator {
    async fn generate(&self, jobs: Vec<KeyPairJob>) -> Result<Vec<ConnectionKeyPair>, PoolError> {
        let workers: Vec<usize> = jobs.iter().map(|job| job.worker).collect();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let reply_tx = reply_tx.clone();
            let work = self.worker;
            debug!(worker = job.worker, start = job.slice.start, count = job.slice.count, "dispatching worker");
            handles.push(tokio::task::spawn_blocking(move || {
                let result = work(&job);
                // The receiver is held until every worker has been joined.
                let _ = reply_tx.send(WorkerReply {
                    worker: job.worker,
                    result,
                });
            }));
        }
        drop(reply_tx);

        let mut replies = Vec::with_capacity(workers.len());
        while let Some(reply) = reply_rx.recv().await {
            replies.push(reply);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "key generation worker panicked");
            }
        }

        let mut pairs = Vec::new();
        for worker in workers {
            let Some(reply) = replies.iter_mut().find(|r| r.worker == worker) else {
                return Err(PoolError::WorkerLost { worker });
            };
            let result = std::mem::replace(&mut reply.result, Ok(Vec::new()));
            pairs.extend(result?);
        }
        Ok(pairs)
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

/// Runs every job on the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineGenerator;

#[async_trait]
impl KeyPairGenerator for InlineGenerator {
    async fn generate(&self, jobs: Vec<KeyPairJob>) -> Result<Vec<ConnectionKeyPair>, PoolError> {
        let mut pairs = Vec::new();
        for job in &jobs {
            pairs.extend(derive_slice(job)?);
        }
        Ok(pairs)
    }

    fn name(&self) -> &'static str {
        "synchronous"
    }
}

/// Generator for a configured strategy.
pub fn generator_for(strategy: KeyGenStrategy) -> Box<dyn KeyPairGenerator> {
    match strategy {
        KeyGenStrategy::Parallel => Box::new(ThreadPoolGenerator::new()),
        KeyGenStrategy::Synchronous => Box::new(InlineGenerator),
    }
}

/// Counts describing the wallet's current connection keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRequest {
    /// Connections that need keys right now.
    pub connections_count: u32,
    /// Connection keys the caller already holds.
    pub known_count: usize,
    /// Highest index already handed out; negative when none.
    pub last_index: i64,
}

/// Produces batches of [`ConnectionKeyPair`]s.
pub struct ConnectionKeyPairPool {
    config: PoolConfig,
    template: PathTemplate,
    generator: Box<dyn KeyPairGenerator>,
}

impl ConnectionKeyPairPool {
    /// Pool using the generator selected by `config.strategy`.
    pub fn new(config: PoolConfig) -> Result<Self, DerivationError> {
        let generator = generator_for(config.strategy);
        Self::with_generator(config, generator)
    }

    pub fn with_generator(
        config: PoolConfig,
        generator: Box<dyn KeyPairGenerator>,
    ) -> Result<Self, DerivationError> {
        let template = config.template.parse()?;
        Ok(Self {
            config,
            template,
            generator,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Slices a batch for `request` would be split into. Empty when the
    /// pre-generation threshold has been exceeded.
    pub fn plan_slices(&self, request: &PoolRequest) -> Result<Vec<IndexSlice>, DerivationError> {
        if request.known_count > self.config.pregeneration_threshold {
            return Ok(Vec::new());
        }
        let start = start_index(request.last_index)?;
        let total = request.connections_count.saturating_add(self.config.pool_size);
        let end = u64::from(start) + u64::from(total);
        if end > u64::from(HARDENED_OFFSET) {
            return Err(DerivationError::IndexOutOfRange {
                index: end - 1,
                kind: "normal",
            });
        }
        partition(start, total, self.config.workers)
    }

    /// Generate the next batch, sorted ascending by `connIndex`.
    pub async fn generate(
        &self,
        secret: &WalletSecret,
        request: PoolRequest,
    ) -> Result<Vec<ConnectionKeyPair>, PoolError> {
        let slices = self.plan_slices(&request)?;
        if slices.is_empty() {
            debug!(
                known = request.known_count,
                threshold = self.config.pregeneration_threshold,
                "no connection keys to generate"
            );
            return Ok(Vec::new());
        }

        let jobs = slices
            .iter()
            .enumerate()
            .map(|(worker, slice)| KeyPairJob {
                worker,
                secret: secret.clone(),
                template: self.template.clone(),
                slice: *slice,
            })
            .collect::<Vec<_>>();

        let mut pairs = self.generator.generate(jobs).await?;
        pairs.sort_by_key(|pair| pair.conn_index);
        info!(
            generated = pairs.len(),
            first = pairs.first().map(|p| p.conn_index),
            strategy = self.generator.name(),
            "connection keys generated"
        );
        Ok(pairs)
    }
}

impl fmt::Debug for ConnectionKeyPairPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionKeyPairPool")
            .field("config", &self.config)
            .field("generator", &self.generator.name())
            .finish()
    }
}
