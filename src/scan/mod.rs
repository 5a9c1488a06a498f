pub mod geoip;
pub mod ping;
pub mod task;

pub use geoip::{AsnTable, CityTable, GeoLookup, MaxMindAsnTable, MaxMindCityTable};
pub use ping::{PingProbe, Platform, Probe, parse_ping_output};
pub use task::ProbeTask;
