// Durable storage layer
pub mod candles;

pub use candles::CandleRepository;
