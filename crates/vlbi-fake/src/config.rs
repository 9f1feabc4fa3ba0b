//! Environment configuration.
//!
//! Every setting is a `VLBI_FAKE_*` variable. Loading goes through a lookup
//! closure so it can be driven from a map in tests.

use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use vlbi_blast::{BlastConfig, ConfigError, Destination, Pacing, TransportMode};
use vlbi_epoch::{calendar_to_mjd, from_day_of_year, mjd_to_calendar, parse_time_of_day};
use vlbi_frame::{Variant, station_code};

const PREFIX: &str = "VLBI_FAKE_";

/// Typed access to `VLBI_FAKE_*` values.
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", PREFIX, name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get<T>(&self, name: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.raw(name) {
            Some(value) => value
                .parse()
                .map(Some)
                .with_context(|| format!("{}{} = {:?}", PREFIX, name, value)),
            None => Ok(None),
        }
    }

    fn get_or<T>(&self, name: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        Ok(self.get(name)?.unwrap_or(default))
    }

    fn flag(&self, name: &str) -> anyhow::Result<bool> {
        match self.raw(name).map(|v| v.to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => bail!("{}{} = {:?} is not a boolean", PREFIX, name, v),
            },
        }
    }
}

/// Start date and time as given, before resolving against the clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartSpec {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub dayno: Option<u32>,
    pub mjd: Option<f64>,
    pub time: Option<String>,
}

impl StartSpec {
    /// Resolve to an MJD. Unset date fields come from `now_mjd`, and an
    /// unset time is the current UT.
    pub fn resolve(&self, now_mjd: f64) -> anyhow::Result<f64> {
        let now = mjd_to_calendar(now_mjd);
        let ut = match self.time.as_deref() {
            Some(time) => parse_time_of_day(time)?,
            None => now.day_fraction,
        };

        if let Some(mjd) = self.mjd {
            return Ok(mjd + ut);
        }

        let year = self.year.unwrap_or(now.year);
        let (day, month) = match self.dayno {
            Some(dayno) => from_day_of_year(dayno, year)
                .with_context(|| format!("day of year {} is not in {}", dayno, year))?,
            None => (self.day.unwrap_or(now.day), self.month.unwrap_or(now.month)),
        };
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            bail!("invalid start date {}/{}/{}", day, month, year);
        }

        Ok(calendar_to_mjd(day, month, year) as f64 + ut)
    }
}

/// Build a run configuration from `lookup`, sampling the clock as
/// `now_mjd`.
pub fn load<F>(lookup: F, now_mjd: f64) -> anyhow::Result<BlastConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    let destination = Destination {
        host: env.raw("HOST").unwrap_or_else(|| "localhost".into()),
        port: env.get_or("PORT", 52100)?,
    };

    let drop_every = match env.get::<u64>("DROP")? {
        Some(n) => Some(NonZeroU64::new(n).ok_or(ConfigError::DropInterval)?),
        None => None,
    };

    let transport = match env.get::<usize>("UDP")? {
        Some(mtu) => TransportMode::Datagram {
            mtu,
            sequence: !env.flag("NOVTP")?,
            drop_every,
        },
        None => {
            if drop_every.is_some() {
                tracing::warn!("VLBI_FAKE_DROP only applies to datagram transport, ignoring");
            }
            TransportMode::Stream {
                frame_bytes: env.get_or("FRAMESIZE", 9000)?,
            }
        }
    };

    let pacing = match (env.get::<f64>("RATE")?, env.get::<f64>("USLEEP")?) {
        (Some(mbps), _) => Pacing::RateMbps(mbps),
        (None, Some(us)) => {
            if !us.is_finite() || us < 0.0 {
                bail!("{}USLEEP = {} must be a non-negative delay", PREFIX, us);
            }
            Pacing::Delay(Duration::from_secs_f64(us / 1e6))
        }
        (None, None) => Pacing::None,
    };

    let update: f64 = env.get_or("UPDATE", 1.0)?;
    if !update.is_finite() || update <= 0.0 {
        bail!("{}UPDATE = {} must be a positive number of seconds", PREFIX, update);
    }

    let station = env.raw("STATION").unwrap_or_else(|| "Tt".into());
    let start = StartSpec {
        day: env.get("DAY")?,
        month: env.get("MONTH")?,
        year: env.get("YEAR")?,
        dayno: env.get("DAYNO")?,
        mjd: env.get("MJD")?,
        time: env.raw("TIME"),
    };

    Ok(BlastConfig {
        format: if env.flag("CODIF")? {
            Variant::Codif
        } else {
            Variant::Vdif
        },
        bandwidth_mhz: env.get_or("BANDWIDTH", 16.0)?,
        channels: env.get_or("NCHAN", 4)?,
        bits_per_sample: env.get_or("BITS", 2)?,
        complex: env.flag("COMPLEX")?,
        threads: env.get_or("NTHREAD", 1)?,
        first_thread: env.get_or("FIRST_THREAD", 0)?,
        station_id: station_code(&station)?,
        transport,
        pacing,
        destination,
        send_buffer: env.get::<usize>("WINDOW")?.map(|kb| kb * 1024),
        start_mjd: start.resolve(now_mjd)?,
        duration_secs: env.get_or("DURATION", 60.0)?,
        report_interval: Duration::from_secs_f64(update),
        logger: None,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    // 2023-02-25 18:00 UT
    const NOW: f64 = 60_000.75;

    fn load_from(vars: &[(&str, &str)]) -> anyhow::Result<BlastConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{}{}", PREFIX, k), v.to_string()))
            .collect();
        load(|key| map.get(key).cloned(), NOW)
    }

    #[test]
    fn defaults() {
        let c = load_from(&[]).unwrap();
        assert_eq!(c.destination.host, "localhost");
        assert_eq!(c.destination.port, 52100);
        assert_eq!(c.transport, TransportMode::Stream { frame_bytes: 9000 });
        assert_eq!(c.format, Variant::Vdif);
        assert_eq!((c.channels, c.bits_per_sample, c.threads), (4, 2, 1));
        assert_eq!(c.bandwidth_mhz, 16.0);
        assert_eq!(c.duration_secs, 60.0);
        assert_eq!(c.pacing, Pacing::None);
        assert_eq!(c.send_buffer, None);
        assert_eq!(c.station_id, station_code("Tt").unwrap());
        assert_eq!(c.report_interval, Duration::from_secs(1));
        assert!((c.start_mjd - NOW).abs() < 1e-9);
    }

    #[test]
    fn datagram_mode() {
        let c = load_from(&[
            ("UDP", "8000"),
            ("NOVTP", "1"),
            ("DROP", "10"),
            ("WINDOW", "2048"),
            ("RATE", "512"),
            ("USLEEP", "20"),
        ])
        .unwrap();
        assert_eq!(
            c.transport,
            TransportMode::Datagram {
                mtu: 8000,
                sequence: false,
                drop_every: NonZeroU64::new(10),
            }
        );
        assert_eq!(c.send_buffer, Some(2048 * 1024));
        assert_eq!(c.pacing, Pacing::RateMbps(512.0));
    }

    #[test]
    fn usleep_without_rate() {
        let c = load_from(&[("UDP", "9000"), ("USLEEP", "250")]).unwrap();
        assert_eq!(c.pacing, Pacing::Delay(Duration::from_micros(250)));
        assert!(load_from(&[("USLEEP", "-1")]).is_err());
    }

    #[test]
    fn zero_drop_interval_rejected() {
        let err = load_from(&[("UDP", "9000"), ("DROP", "0")]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::DropInterval)
        ));
    }

    #[test]
    fn format_flags() {
        let c = load_from(&[("CODIF", "true"), ("COMPLEX", "yes"), ("NTHREAD", "8")]).unwrap();
        assert_eq!(c.format, Variant::Codif);
        assert!(c.complex);
        assert_eq!(c.threads, 8);
        assert!(load_from(&[("CODIF", "maybe")]).is_err());
    }

    #[test]
    fn unparseable_values() {
        for (key, value) in [("PORT", "http"), ("NCHAN", "four"), ("DURATION", "1m"), ("UPDATE", "0")] {
            assert!(load_from(&[(key, value)]).is_err(), "{} = {}", key, value);
        }
        let err = load_from(&[("PORT", "99999")]).unwrap_err();
        assert!(err.to_string().contains("VLBI_FAKE_PORT"));
    }

    #[test]
    fn station_codes() {
        let c = load_from(&[("STATION", "Pa")]).unwrap();
        assert_eq!(c.station_id, u16::from_be_bytes(*b"Pa"));
        assert!(load_from(&[("STATION", "Parkes")]).is_err());
    }

    #[test]
    fn explicit_mjd_and_time() {
        // Without a time the current UT is added, as for calendar dates.
        let c = load_from(&[("MJD", "59000")]).unwrap();
        assert!((c.start_mjd - 59_000.75).abs() < 1e-12);

        let c = load_from(&[("MJD", "59000"), ("TIME", "06:00:00")]).unwrap();
        assert!((c.start_mjd - 59_000.25).abs() < 1e-12);
    }

    #[test]
    fn calendar_date_with_time() {
        let c = load_from(&[
            ("DAY", "1"),
            ("MONTH", "1"),
            ("YEAR", "2000"),
            ("TIME", "12:00"),
        ])
        .unwrap();
        assert!((c.start_mjd - 51_544.5).abs() < 1e-12);
    }

    #[test]
    fn dayno_overrides_day_and_month() {
        let c = load_from(&[
            ("YEAR", "2024"),
            ("DAYNO", "60"),
            ("DAY", "15"),
            ("MONTH", "7"),
            ("TIME", "0"),
        ])
        .unwrap();
        assert_eq!(c.start_mjd, 60_369.0);
        assert!(load_from(&[("YEAR", "2023"), ("DAYNO", "366")]).is_err());
    }

    #[test]
    fn date_fields_default_to_today() {
        let spec = StartSpec {
            time: Some("00:00:30".into()),
            ..Default::default()
        };
        let mjd = spec.resolve(NOW).unwrap();
        assert!((mjd - (60_000.0 + 30.0 / 86_400.0)).abs() < 1e-12);

        let bad = StartSpec {
            time: Some("noon".into()),
            ..Default::default()
        };
        assert!(bad.resolve(NOW).is_err());
    }
}
