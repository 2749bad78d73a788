pub mod benchmark;
pub mod transfer;

pub use benchmark::{CpuBenchmark, FixedLoad, LoadProbe};
pub use transfer::{LogOnlyTransfer, TransferAgent, TransferDone, TransferQueue};
