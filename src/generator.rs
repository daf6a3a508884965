//! Synthetic telemetry
//!
//! Produces reproducible payloads for the four scenarios and pushes them to a
//! [`PayloadSink`]: the HTTP API of a running service or an in-process
//! [`IngestProcessor`].

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TelemetryError;
use crate::pipeline::IngestProcessor;
use crate::physics::clamp;
use crate::schema::{DataSource, PayloadCodec, Scenario, TelemetryPayload};
use crate::types::TelemetryResponse;

pub const DEMO_BUILDING_ID: &str = "RUTGERS-ENG-1";
pub const DEMO_AIR_NODE_ID: &str = "AIR-001";
pub const DEMO_WATER_NODE_ID: &str = "WATER-001";

/// Simulated clock advancing a fixed number of seconds per tick
#[derive(Debug, Clone)]
pub struct DemoClock {
    start: DateTime<Utc>,
    speed_secs: i64,
    ticks: i64,
}

impl DemoClock {
    /// Seconds of simulated time per tick by default
    pub const DEFAULT_SPEED_SECS: i64 = 60;

    pub fn new(start: DateTime<Utc>, speed_secs: i64) -> Self {
        Self {
            start,
            speed_secs,
            ticks: 0,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.ticks * self.speed_secs)
    }

    /// Advance one tick and return the new time
    pub fn tick(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        self.now()
    }
}

/// Current UTC time truncated to whole seconds
pub fn utc_now_floor() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn quantize(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

fn jitter(rng: &mut StdRng, amplitude: f64) -> f64 {
    rng.gen_range(-amplitude..=amplitude)
}

/// Build the payload of `step` for `scenario`.
///
/// The RNG is seeded with `seed + step` so any step can be regenerated on its
/// own. Readings are quantized and clipped like a cheap sensor would report
/// them, except the stuck humidity of a sensor fault.
pub fn build_payload(ts: DateTime<Utc>, scenario: Scenario, step: u64, seed: u64) -> TelemetryPayload {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(step));
    let s = step as f64;

    let mut air_temp = 22.0 + jitter(&mut rng, 0.3);
    let mut air_rh = 45.0 + jitter(&mut rng, 2.0);
    let water_temp = 18.5 + jitter(&mut rng, 0.2);
    let mut turb = 0.8 + jitter(&mut rng, 0.1);
    let mut chlorine = 1.2 + jitter(&mut rng, 0.1);
    let ph = 7.4 + jitter(&mut rng, 0.05);
    let mut cond = 350.0 + jitter(&mut rng, 10.0);
    let pressure = 280.0 + jitter(&mut rng, 5.0);

    match scenario {
        Scenario::Normal => {}
        Scenario::MoldEpisode => {
            air_rh = (70.0 + 0.4 * s + jitter(&mut rng, 1.5)).min(95.0);
            air_temp = 23.0 + jitter(&mut rng, 0.2);
        }
        Scenario::WaterEvent => {
            turb = 5.0 + 1.2 * s + jitter(&mut rng, 2.0);
            chlorine = (0.6 - 0.02 * s + jitter(&mut rng, 0.05)).max(0.1);
            cond = 500.0 + 15.0 * s + jitter(&mut rng, 20.0);
        }
        Scenario::SensorFault => {
            air_rh = 110.0;
            turb = 0.0;
            chlorine = 0.0;
        }
    }

    let air_temp = clamp(quantize(air_temp, 0.1), 15.0, 30.0);
    let air_rh = match scenario {
        Scenario::SensorFault => air_rh,
        _ => clamp(quantize(air_rh, 0.1), 20.0, 98.0),
    };

    let air_co2 = clamp(quantize(620.0 + jitter(&mut rng, 40.0), 1.0), 400.0, 2000.0);
    let air_pm25 = clamp(quantize(8.0 + jitter(&mut rng, 3.0), 1.0), 0.0, 150.0);
    let air_tvoc = clamp(quantize(150.0 + jitter(&mut rng, 30.0), 1.0), 0.0, 2000.0);
    let air_surface_temp = quantize(air_temp - 0.6 + jitter(&mut rng, 0.1), 0.1);
    let material_moisture = clamp(quantize(0.08 + (air_rh - 45.0) / 500.0, 0.01), 0.01, 0.6);

    TelemetryPayload {
        ts,
        building_id: DEMO_BUILDING_ID.to_string(),
        air_node_id: DEMO_AIR_NODE_ID.to_string(),
        water_node_id: DEMO_WATER_NODE_ID.to_string(),
        air_temp_c: air_temp,
        air_rh_pct: air_rh,
        water_temp_c: clamp(quantize(water_temp, 0.1), 5.0, 30.0),
        water_turbidity_ntu: clamp(quantize(turb, 0.1), 0.0, 1000.0),
        water_free_chlorine_mg_l: clamp(quantize(chlorine, 0.01), 0.0, 5.0),
        water_ph: clamp(quantize(ph, 0.01), 0.0, 14.0),
        water_conductivity_us_cm: clamp(quantize(cond, 1.0), 0.0, 5000.0),
        water_pressure_kpa: clamp(quantize(pressure, 0.1), 0.0, 1000.0),
        scenario,
        data_source: DataSource::Emulated,
        air_co2_ppm: Some(air_co2),
        air_pm25_ugm3: Some(air_pm25),
        air_tvoc: Some(air_tvoc),
        air_surface_temp_c: Some(air_surface_temp),
        air_material_moisture: Some(material_moisture),
    }
}

/// Destination for generated payloads
pub trait PayloadSink {
    fn send(&mut self, payload: &TelemetryPayload) -> Result<TelemetryResponse, TelemetryError>;
}

/// Posts payloads to `POST {base_url}/telemetry`
pub struct HttpSink {
    agent: ureq::Agent,
    url: String,
    codec: PayloadCodec,
}

impl HttpSink {
    pub fn new(base_url: &str, codec: PayloadCodec) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(StdDuration::from_secs(5))
            .build();
        Self {
            agent,
            url: format!("{}/telemetry", base_url.trim_end_matches('/')),
            codec,
        }
    }
}

impl PayloadSink for HttpSink {
    fn send(&mut self, payload: &TelemetryPayload) -> Result<TelemetryResponse, TelemetryError> {
        let body = self.codec.encode(payload)?;
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", self.codec.content_type())
            .send_bytes(&body)?;
        Ok(response.into_json()?)
    }
}

/// Feeds payloads straight into an in-process processor
pub struct ProcessorSink<'a> {
    processor: &'a mut IngestProcessor,
}

impl<'a> ProcessorSink<'a> {
    pub fn new(processor: &'a mut IngestProcessor) -> Self {
        Self { processor }
    }
}

impl PayloadSink for ProcessorSink<'_> {
    fn send(&mut self, payload: &TelemetryPayload) -> Result<TelemetryResponse, TelemetryError> {
        self.processor.ingest(payload.clone())
    }
}

/// Totals of a generator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sent: u64,
    pub alerts: u64,
}

/// Scenario generator driving a [`DemoClock`]
#[derive(Debug, Clone)]
pub struct Generator {
    pub scenario: Scenario,
    pub seed: u64,
    /// Wall-clock pause between payloads
    pub rate: StdDuration,
    clock: DemoClock,
}

impl Generator {
    pub fn new(scenario: Scenario, seed: u64, rate: StdDuration, clock: DemoClock) -> Self {
        Self {
            scenario,
            seed,
            rate,
            clock,
        }
    }

    /// Generator starting now, one simulated minute per payload
    pub fn starting_now(scenario: Scenario, seed: u64, rate: StdDuration) -> Self {
        Self::new(
            scenario,
            seed,
            rate,
            DemoClock::new(utc_now_floor(), DemoClock::DEFAULT_SPEED_SECS),
        )
    }

    /// Send `count` payloads, or run until an error when `count` is `None`
    pub fn run(
        &mut self,
        sink: &mut dyn PayloadSink,
        count: Option<u64>,
    ) -> Result<RunSummary, TelemetryError> {
        info!(
            "generating {} payloads (seed {}, {:?} apart)",
            self.scenario, self.seed, self.rate
        );
        let mut summary = RunSummary::default();
        let mut step = 0u64;
        while count.map_or(true, |n| step < n) {
            let ts = self.clock.tick();
            let payload = build_payload(ts, self.scenario, step, self.seed);
            let response = sink.send(&payload)?;
            debug!(
                "step {step}: mold {:.3} pred {:.3} water {:.3}",
                response.idx_mold_now, response.pred_idx_mold_h, response.idx_water_event_now
            );

            summary.sent += 1;
            summary.alerts += response.alerts.len() as u64;
            step += 1;
            if !self.rate.is_zero() {
                thread::sleep(self.rate);
            }
        }
        info!("sent {} payloads, {} alerts raised", summary.sent, summary.alerts);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::t0;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_demo_clock() {
        let mut clock = DemoClock::new(t0(), DemoClock::DEFAULT_SPEED_SECS);
        assert_eq!(clock.now(), t0());
        assert_eq!(clock.tick(), t0() + Duration::minutes(1));
        assert_eq!(clock.tick(), t0() + Duration::minutes(2));
    }

    #[test]
    fn test_build_payload_is_reproducible() {
        let a = build_payload(t0(), Scenario::Normal, 3, 42);
        let b = build_payload(t0(), Scenario::Normal, 3, 42);
        let c = build_payload(t0(), Scenario::Normal, 4, 42);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_normal_payload_shape() {
        let p = build_payload(t0(), Scenario::Normal, 0, 42);
        assert_eq!(p.building_id, DEMO_BUILDING_ID);
        assert_eq!(p.data_source, DataSource::Emulated);
        assert_eq!(p.optional_count(), 5);
        assert!(p.validate().is_ok());
        assert!((21.6..=22.4).contains(&p.air_temp_c));
        assert!((42.9..=47.1).contains(&p.air_rh_pct));
        assert!((340.0..=360.0).contains(&p.water_conductivity_us_cm));
        assert_eq!(p.water_conductivity_us_cm.fract(), 0.0);
    }

    #[test]
    fn test_mold_episode_ramps_and_caps() {
        let early = build_payload(t0(), Scenario::MoldEpisode, 0, 7);
        let late = build_payload(t0(), Scenario::MoldEpisode, 200, 7);
        assert!(early.air_rh_pct < 72.0);
        assert!(late.air_rh_pct > 94.9 && late.air_rh_pct < 95.01);
    }

    #[test]
    fn test_water_event_drops_chlorine() {
        let p = build_payload(t0(), Scenario::WaterEvent, 40, 7);
        assert!((p.water_free_chlorine_mg_l - 0.1).abs() < 1e-9);
        assert!(p.water_turbidity_ntu > 45.0);
        assert!(p.water_conductivity_us_cm > 1000.0);
    }

    #[test]
    fn test_sensor_fault_keeps_out_of_range_humidity() {
        let p = build_payload(t0(), Scenario::SensorFault, 0, 7);
        assert_eq!(p.air_rh_pct, 110.0);
        assert_eq!(p.water_turbidity_ntu, 0.0);
    }

    #[test]
    fn test_run_into_processor() {
        let mut processor = IngestProcessor::in_memory();
        let mut generator = Generator::new(
            Scenario::MoldEpisode,
            42,
            StdDuration::ZERO,
            DemoClock::new(t0(), 60),
        );

        let summary = generator
            .run(&mut ProcessorSink::new(&mut processor), Some(120))
            .unwrap();
        assert_eq!(summary.sent, 120);
        assert!(summary.alerts > 0);

        let latest = processor.store().latest().raw.unwrap();
        assert_eq!(latest.payload.ts, t0() + Duration::minutes(120));
    }
}
