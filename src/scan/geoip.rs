use crate::target::Target;
use crate::types::{GeoInfo, NOT_AVAILABLE};
use eyre::{Result, WrapErr};
use maxminddb::{MaxMindDBError, Reader, geoip2};
use std::net::IpAddr;
use std::path::Path;

const COUNTRY_NAME_LOCALE: &str = "en";

/// City-level geography table
pub trait CityTable: Send + Sync {
    /// Country name for the address, `Ok(None)` when the table has no entry
    fn country_name(&self, ip: IpAddr) -> Result<Option<String>>;
}

/// ASN-level ownership table
pub trait AsnTable: Send + Sync {
    /// Organization owning the address, `Ok(None)` when the table has no entry
    fn organization(&self, ip: IpAddr) -> Result<Option<String>>;
}

/// GeoLite2-City database opened from disk
pub struct MaxMindCityTable {
    reader: Reader<Vec<u8>>,
}

impl MaxMindCityTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path)
            .wrap_err_with(|| format!("Failed to open city database: {}", path.display()))?;
        log::info!("[scan::geoip] city_table_opened: path={} type={}",
            path.display(), reader.metadata.database_type);
        Ok(Self { reader })
    }
}

impl CityTable for MaxMindCityTable {
    fn country_name(&self, ip: IpAddr) -> Result<Option<String>> {
        match self.reader.lookup::<geoip2::City>(ip) {
            Ok(city) => Ok(city
                .country
                .and_then(|country| country.names)
                .and_then(|names| names.get(COUNTRY_NAME_LOCALE).map(|name| name.to_string()))),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(e).wrap_err("City lookup failed"),
        }
    }
}

/// GeoLite2-ASN database opened from disk
pub struct MaxMindAsnTable {
    reader: Reader<Vec<u8>>,
}

impl MaxMindAsnTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path)
            .wrap_err_with(|| format!("Failed to open ASN database: {}", path.display()))?;
        log::info!("[scan::geoip] asn_table_opened: path={} type={}",
            path.display(), reader.metadata.database_type);
        Ok(Self { reader })
    }
}

impl AsnTable for MaxMindAsnTable {
    fn organization(&self, ip: IpAddr) -> Result<Option<String>> {
        match self.reader.lookup::<geoip2::Asn>(ip) {
            Ok(asn) => Ok(asn.autonomous_system_organization.map(str::to_string)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(e).wrap_err("ASN lookup failed"),
        }
    }
}

/// Resolves targets to country and network owner.
///
/// Each table is optional; which ones are present is fixed at construction.
/// Tables are read-only, so one instance is shared by every worker.
#[derive(Default)]
pub struct GeoLookup {
    city: Option<Box<dyn CityTable>>,
    asn: Option<Box<dyn AsnTable>>,
}

impl GeoLookup {
    pub fn new(city: Option<Box<dyn CityTable>>, asn: Option<Box<dyn AsnTable>>) -> Self {
        log::debug!("[scan::geoip] new: city_table={} asn_table={}", city.is_some(), asn.is_some());
        Self { city, asn }
    }

    /// Lookup with no tables: every field stays "N/A"
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Open whichever of the two database files exist.
    ///
    /// A missing file disables that table; a file that exists but cannot be
    /// opened is reported as an error.
    pub fn open(city_path: &Path, asn_path: &Path) -> Result<Self> {
        let city: Option<Box<dyn CityTable>> = if city_path.exists() {
            Some(Box::new(MaxMindCityTable::open(city_path)?))
        } else {
            log::warn!("[scan::geoip] city_table_missing: path={}", city_path.display());
            None
        };

        let asn: Option<Box<dyn AsnTable>> = if asn_path.exists() {
            Some(Box::new(MaxMindAsnTable::open(asn_path)?))
        } else {
            log::warn!("[scan::geoip] asn_table_missing: path={}", asn_path.display());
            None
        };

        Ok(Self::new(city, asn))
    }

    pub fn has_city_table(&self) -> bool {
        self.city.is_some()
    }

    pub fn has_asn_table(&self) -> bool {
        self.asn.is_some()
    }

    /// Never fails: misses become "N/A", internal errors become "Error"
    pub fn lookup(&self, target: &Target) -> GeoInfo {
        match self.try_lookup(target) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("[scan::geoip] lookup_failed: target={} error={:#}", target, e);
                GeoInfo::error()
            }
        }
    }

    fn try_lookup(&self, target: &Target) -> Result<GeoInfo> {
        if self.city.is_none() && self.asn.is_none() {
            return Ok(GeoInfo::unavailable());
        }

        let ip = target
            .ip()
            .ok_or_else(|| eyre::eyre!("'{}' is not an IP address", target))?;

        let country = match &self.city {
            Some(table) => table.country_name(ip)?,
            None => None,
        };
        let organization = match &self.asn {
            Some(table) => table.organization(ip)?,
            None => None,
        };

        log::trace!("[scan::geoip] lookup_completed: ip={} country={:?} organization={:?}",
            ip, country, organization);

        Ok(GeoInfo::new(
            country.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            organization.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ))
    }
}
