use anyhow::bail;
use clap::Parser;
use coexpr::{
    PipelineConfig, SchemaPolicy,
    config::{
        DEFAULT_BATCH_BUFFER_SIZE, DEFAULT_NUM_WORKERS, DEFAULT_RESULT_BUFFER_SIZE,
        DEFAULT_ROW_BUFFER_SIZE, DEFAULT_VECTOR_CAPACITY_HINT,
    },
};
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `coexpr-server` binary.
///
/// Every value can be given as a CLI flag or an environment variable (a `.env`
/// file is loaded first). The defaults suit a single service instance serving
/// profiles from a local directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "coexpr-server",
    version,
    about = "An HTTP service streaming Spearman co-expression results"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:1970"))]
    pub server_addr: String,

    /// Directory holding one Arrow IPC file per molecular profile, named
    /// `<profile_id>.arrow`.
    ///
    /// Environment variable: `DATA_DIR`
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Number of correlation workers shared by all requests.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = DEFAULT_NUM_WORKERS)]
    pub num_workers: usize,

    /// Capacity of the queue between the fetch and materialize stages.
    ///
    /// This bounds how many columnar batches a request holds at once.
    ///
    /// Environment variable: `BATCH_BUFFER_SIZE`
    #[arg(long, env = "BATCH_BUFFER_SIZE", default_value_t = DEFAULT_BATCH_BUFFER_SIZE)]
    pub batch_buffer_size: usize,

    /// Capacity of the queue between the materialize and aggregate stages.
    ///
    /// Environment variable: `ROW_BUFFER_SIZE`
    #[arg(long, env = "ROW_BUFFER_SIZE", default_value_t = DEFAULT_ROW_BUFFER_SIZE)]
    pub row_buffer_size: usize,

    /// Capacity of the result queue between the workers and the response
    /// body.
    ///
    /// Environment variable: `RESULT_BUFFER_SIZE`
    #[arg(long, env = "RESULT_BUFFER_SIZE", default_value_t = DEFAULT_RESULT_BUFFER_SIZE)]
    pub result_buffer_size: usize,

    /// Initial capacity of each gene's value vector.
    ///
    /// Environment variable: `VECTOR_CAPACITY_HINT`
    #[arg(long, env = "VECTOR_CAPACITY_HINT", default_value_t = DEFAULT_VECTOR_CAPACITY_HINT)]
    pub vector_capacity_hint: usize,

    /// What to do with batches or rows that do not match the profile schema:
    /// `abort` fails the request, `skip` drops them with a warning.
    ///
    /// Environment variable: `SCHEMA_POLICY`
    #[arg(long, env = "SCHEMA_POLICY", default_value_t = SchemaPolicy::Abort)]
    pub schema_policy: SchemaPolicy,

    /// Seconds to wait for in-flight streams, and then for each worker, during
    /// shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub data_dir: PathBuf,
    pub num_workers: usize,
    pub pipeline: PipelineConfig,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }
        if args.batch_buffer_size == 0 {
            bail!("BATCH_BUFFER_SIZE must be greater than 0");
        }
        if args.row_buffer_size == 0 {
            bail!("ROW_BUFFER_SIZE must be greater than 0");
        }
        if args.result_buffer_size == 0 {
            bail!("RESULT_BUFFER_SIZE must be greater than 0");
        }
        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            data_dir: args.data_dir,
            num_workers: args.num_workers,
            pipeline: PipelineConfig {
                batch_buffer_size: args.batch_buffer_size,
                row_buffer_size: args.row_buffer_size,
                result_buffer_size: args.result_buffer_size,
                vector_capacity_hint: args.vector_capacity_hint,
                schema_policy: args.schema_policy,
            },
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
