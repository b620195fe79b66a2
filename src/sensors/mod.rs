//! Environment sensors: the safety-critical gas monitor plus the optional
//! temperature and light probes that enrich the status report.

pub mod gas;
pub mod light;
pub mod temperature;

pub use gas::{spawn_gas_sampler, GasMonitor, GasReading, GasSamplerHandle, GasTransition};
pub use light::{classify_lux, LightLevel, LightSensor};
pub use temperature::TemperatureProbe;
