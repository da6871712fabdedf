//! Parallel reads across several connections
//!
//! A session serializes its exchanges, so parallelism comes from opening one
//! session per worker. Each worker attaches to the target on its own
//! connection and handles a contiguous slice of the requests.

use crate::config::Config;
use crate::core::types::{Address, CeError, CeResult, MemoryValue, Offset, ProcessId, ValueType};
use crate::memory::pointer::PointerChain;
use crate::memory::reader::MemorySource;
use crate::protocol::session::{ConnectOptions, Session};
use crate::process::attach::AttachedProcess;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One value to read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchRead {
    /// A value at a fixed address
    Direct {
        address: Address,
        value_type: ValueType,
    },
    /// A value at the end of a pointer chain
    Chain {
        chain: PointerChain,
        final_offset: Offset,
        value_type: ValueType,
    },
}

impl BatchRead {
    pub fn direct(address: Address, value_type: ValueType) -> Self {
        BatchRead::Direct {
            address,
            value_type,
        }
    }

    fn run<M: MemorySource>(&self, source: &mut M) -> CeResult<Option<MemoryValue>> {
        match self {
            BatchRead::Direct {
                address,
                value_type,
            } => source.read_value(*address, *value_type),
            BatchRead::Chain {
                chain,
                final_offset,
                value_type,
            } => chain.read_value(source, *final_offset, *value_type),
        }
    }
}

/// Fans reads of one process out over a pool of sessions
pub struct BatchReader {
    options: ConnectOptions,
    pid: ProcessId,
    workers: usize,
}

impl BatchReader {
    /// One worker per CPU
    pub fn new(options: ConnectOptions, pid: ProcessId) -> Self {
        BatchReader {
            options,
            pid,
            workers: num_cpus::get(),
        }
    }

    /// Connection settings and worker count from the client config
    pub fn from_config(config: &Config, pid: ProcessId) -> Self {
        BatchReader::new(config.connect_options(), pid).with_workers(config.client.workers)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Performs every read, preserving request order in the result
    pub fn read_all(&self, requests: &[BatchRead]) -> CeResult<Vec<Option<MemoryValue>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.workers.min(requests.len());
        let chunk_size = requests.len().div_ceil(workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ce-batch-{}", i))
            .build()
            .map_err(|e| CeError::Io(std::io::Error::other(e)))?;

        debug!(
            pid = self.pid,
            requests = requests.len(),
            workers,
            "starting batch read"
        );
        let chunks: Vec<Vec<Option<MemoryValue>>> = pool.install(|| {
            requests
                .par_chunks(chunk_size)
                .map(|chunk| self.read_chunk(chunk))
                .collect::<CeResult<_>>()
        })?;
        Ok(chunks.into_iter().flatten().collect())
    }

    fn read_chunk(&self, chunk: &[BatchRead]) -> CeResult<Vec<Option<MemoryValue>>> {
        let mut session = Session::connect(self.options.clone())?;
        let Some(mut process) = AttachedProcess::attach(&mut session, self.pid)? else {
            warn!(pid = self.pid, "worker could not open process");
            return Ok(vec![None; chunk.len()]);
        };
        let values = chunk
            .iter()
            .map(|request| request.run(&mut process))
            .collect::<CeResult<Vec<_>>>()?;
        process.detach()?;
        Ok(values)
    }
}
