//! Starbridge Benchmarks
//!
//! Marshalling, classification and broadcasting throughput.
//! Run with: cargo bench -p starbridge-benchmarks

// Empty lib target; the benchmarks live in benches/.
