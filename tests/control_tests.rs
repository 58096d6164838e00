//! Control Session Tests
//!
//! These tests run on the host with std feature enabled.
//! Run with: cargo test --no-default-features --features std
//!
//! Every tier is driven by hand against a recording mock of the power stage.

use cllc_control::config::{sense, ConfigError, ConverterConfig, TIMER_CLOCK_HZ};
use cllc_control::control::{CommandMailbox, ControlSession, InputError};
use cllc_control::hal::{ModulationOutput, RawSamples, RectifierDriver, SafeOutput, SensorFrontEnd};
use cllc_control::modulation::{ModulationCommand, TimerTiming};
use cllc_control::protection::{FaultLines, TripCause};
use cllc_control::rectification::SrMode;
use cllc_control::types::{
    Bridge, ControlMode, ExecutionCore, LoopState, PowerFlowDirection,
};

// =============================================================================
// Mock Power Stage
// =============================================================================

struct MockHal {
    samples: RawSamples,
    faults: FaultLines,
    written: Vec<ModulationCommand>,
    triggers: Vec<u32>,
    reconfigured: Vec<(SrMode, Bridge)>,
    remapped: Vec<SrMode>,
    forced: u32,
    released: u32,
}

impl MockHal {
    fn new() -> Self {
        Self {
            samples: idle_samples(),
            faults: FaultLines::CLEAR,
            written: Vec::new(),
            triggers: Vec::new(),
            reconfigured: Vec::new(),
            remapped: Vec::new(),
            forced: 0,
            released: 0,
        }
    }
}

impl SensorFrontEnd for MockHal {
    fn read_raw_samples(&mut self) -> RawSamples {
        self.samples
    }

    fn read_fault_lines(&mut self) -> FaultLines {
        self.faults
    }
}

impl ModulationOutput for MockHal {
    fn write_modulation(&mut self, command: &ModulationCommand) {
        self.written.push(*command);
    }

    fn set_update_trigger(&mut self, ticks: u32) {
        self.triggers.push(ticks);
    }
}

impl RectifierDriver for MockHal {
    fn reconfigure_synchronous_rectification(&mut self, mode: SrMode, bridge: Bridge) {
        self.reconfigured.push((mode, bridge));
    }

    fn remap_pwm_pins(&mut self, mode: SrMode) {
        self.remapped.push(mode);
    }
}

impl SafeOutput for MockHal {
    fn force_safe_output(&mut self) {
        self.forced += 1;
    }

    fn clear_safe_output(&mut self) {
        self.released += 1;
    }
}

/// Both buses at nominal, currents at mid-scale (zero amps)
fn idle_samples() -> RawSamples {
    RawSamples {
        i_primary: 0.5,
        i_primary_tank: 0.5,
        i_secondary: 0.5,
        v_primary: 400.0 / sense::V_PRIMARY_VOLTS,
        v_secondary: 350.0 / sense::V_SECONDARY_VOLTS,
    }
}

/// Plain timer so tick counts stay readable; no averaging lag
fn bench_config() -> ConverterConfig {
    ConverterConfig {
        timing: TimerTiming::plain(TIMER_CLOCK_HZ),
        average_alpha: 1.0,
        ..ConverterConfig::default()
    }
}

fn nominal_command() -> ModulationCommand {
    ModulationCommand {
        period_ticks: 600,
        duty_primary_a: 300,
        duty_primary_b: 300,
        duty_secondary_a: 270,
        duty_secondary_b: 330,
        phase_shift_ticks: 0,
        deadband_rising_ticks: 24,
        deadband_falling_ticks: 24,
    }
}

// =============================================================================
// Session Construction
// =============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let cfg = ConverterConfig {
        min_switching_hz: 500_000.0,
        ..bench_config()
    };
    assert_eq!(
        ControlSession::new(cfg).err(),
        Some(ConfigError::InvertedFrequencyRange)
    );
}

#[test]
fn test_session_starts_open_loop_and_untripped() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let op = session.operator();
    assert_eq!(op.loop_state(), LoopState::Open);
    assert_eq!(op.trip_state(), TripCause::None);
    assert_eq!(op.sr_mode(), SrMode::Active);
    assert_eq!(session.shared().inputs.voltage_reference_volts.load(), 350.0);
}

#[test]
fn test_primed_command_written_by_update_tier() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert!(parts.update.run(&mut hal));
    assert_eq!(hal.written, vec![nominal_command()]);
    // Half of 600 minus the main-core lead
    assert_eq!(hal.triggers, vec![273]);
}

#[test]
fn test_accelerator_core_uses_shorter_lead() {
    let cfg = ConverterConfig {
        core: ExecutionCore::Accelerator,
        ..bench_config()
    };
    let session = ControlSession::new(cfg).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert_eq!(parts.update.lead_ticks(), 20);
    parts.update.run(&mut hal);
    assert_eq!(hal.triggers, vec![280]);
}

#[test]
fn test_default_timer_arms_trigger_before_turnaround() {
    let session = ControlSession::new(ConverterConfig::default()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert!(parts.update.run(&mut hal));
    // Up-down period register holds 300 cycles at 200 kHz
    assert_eq!(hal.written[0].period_ticks >> 16, 300);
    assert_eq!(hal.triggers, vec![300 - 27]);
}

#[test]
fn test_reverse_direction_swaps_duties_and_target() {
    let cfg = ConverterConfig {
        direction: PowerFlowDirection::SecondaryToPrimary,
        ..bench_config()
    };
    let session = ControlSession::new(cfg).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert_eq!(session.shared().inputs.voltage_reference_volts.load(), 400.0);

    parts.update.run(&mut hal);
    let cmd = hal.written[0];
    assert_eq!((cmd.duty_primary_a, cmd.duty_primary_b), (270, 330));
    assert_eq!((cmd.duty_secondary_a, cmd.duty_secondary_b), (300, 300));

    session.operator().command_sr_mode(SrMode::FixedDuty);
    parts.control.run(&mut hal);
    assert_eq!(hal.reconfigured, vec![(SrMode::FixedDuty, Bridge::Primary)]);
}

// =============================================================================
// Open-Loop Operation
// =============================================================================

#[test]
fn test_open_loop_at_nominal_reproduces_primed_command() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert_eq!(parts.control.run(&mut hal), Some(nominal_command()));
}

#[test]
fn test_open_loop_frequency_change() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts.operator.set_open_loop_frequency(150_000.0);
    let cmd = parts.control.run(&mut hal).expect("command published");
    assert_eq!(cmd.period_ticks, 800);
    assert_eq!((cmd.duty_primary_a, cmd.duty_primary_b), (400, 400));
    assert_eq!((cmd.duty_secondary_a, cmd.duty_secondary_b), (360, 440));

    assert!(parts.update.run(&mut hal));
    assert_eq!(hal.written.last(), Some(&cmd));
    assert_eq!(hal.triggers.last(), Some(&373));
}

#[test]
fn test_open_loop_frequency_is_clamped_to_range() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts.operator.set_open_loop_frequency(50_000.0);
    assert_eq!(parts.control.run(&mut hal).map(|c| c.period_ticks), Some(1200));

    parts.operator.set_open_loop_frequency(1_000_000.0);
    assert_eq!(parts.control.run(&mut hal).map(|c| c.period_ticks), Some(300));
}

#[test]
fn test_zero_frequency_keeps_previous_command() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts.operator.set_open_loop_frequency(150_000.0);
    let good = parts.control.run(&mut hal).expect("command published");

    parts.operator.set_open_loop_frequency(0.0);
    assert_eq!(parts.control.run(&mut hal), None);
    assert_eq!(session.shared().mailbox.latest(), good);

    parts.update.run(&mut hal);
    assert_eq!(hal.written.last(), Some(&good));
}

#[test]
fn test_deadband_setpoint_reaches_command() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts
        .operator
        .set_deadband_ns(100.0, 300.0)
        .expect("valid dead time");
    parts.monitor.run(&mut hal);
    let cmd = parts.control.run(&mut hal).expect("command published");
    assert_eq!(cmd.deadband_rising_ticks, 12);
    assert_eq!(cmd.deadband_falling_ticks, 36);
}

#[test]
fn test_deadband_limited_by_running_period() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    // 4 us fits the longest period but not the shortest
    parts
        .operator
        .set_deadband_ns(4_000.0, 4_000.0)
        .expect("valid dead time");
    parts.operator.set_open_loop_frequency(400_000.0);
    parts.monitor.run(&mut hal);
    let cmd = parts.control.run(&mut hal).expect("command published");
    assert_eq!(cmd.period_ticks, 300);
    assert_eq!(cmd.deadband_rising_ticks, 150);
}

#[test]
fn test_operator_input_validation() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let op = session.operator();

    assert_eq!(op.set_voltage_reference(-1.0), Err(InputError::Negative));
    assert_eq!(op.set_voltage_reference(f32::NAN), Err(InputError::NotFinite));
    assert_eq!(op.set_current_reference(f32::INFINITY), Err(InputError::NotFinite));
    assert_eq!(op.set_phase_shift_ns(f32::NAN), Err(InputError::NotFinite));
    assert_eq!(op.set_deadband_ns(50.0, -1.0), Err(InputError::Negative));

    let inputs = &session.shared().inputs;
    assert_eq!(inputs.voltage_reference_volts.load(), 350.0);
    assert_eq!(inputs.deadband_rising_ns.load(), 200.0);
}

// =============================================================================
// Synchronous Rectification
// =============================================================================

#[test]
fn test_session_starts_in_active_sr_without_reconfiguring() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    let cmd = parts.control.run(&mut hal).expect("command published");
    assert!(hal.reconfigured.is_empty());
    assert!(hal.remapped.is_empty());
    assert_eq!(parts.operator.sr_mode(), SrMode::Active);
    assert_eq!(cmd.phase_shift_ticks, 0);
}

#[test]
fn test_sr_command_reconfigures_and_shifts_phase() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts.operator.command_sr_mode(SrMode::FixedDuty);
    let cmd = parts.control.run(&mut hal).expect("command published");

    assert_eq!(hal.reconfigured, vec![(SrMode::FixedDuty, Bridge::Secondary)]);
    assert_eq!(hal.remapped, vec![SrMode::FixedDuty]);
    assert_eq!(parts.operator.sr_mode(), SrMode::FixedDuty);
    // 81 ns at 120 MHz
    assert_eq!(cmd.phase_shift_ticks, 10);

    parts.control.run(&mut hal);
    assert_eq!(hal.reconfigured.len(), 1, "transition must fire once");
}

// =============================================================================
// Closed-Loop Operation
// =============================================================================

#[test]
fn test_close_loop_request() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts.operator.request_close_loop();
    assert_eq!(parts.operator.loop_state(), LoopState::Open);

    parts.control.run(&mut hal);
    assert_eq!(parts.control.loop_state(), LoopState::Closed);
    assert_eq!(parts.operator.loop_state(), LoopState::Closed);
}

#[test]
fn test_closed_loop_period_saturates_at_range_limits() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();
    let signals = &session.shared().signals;

    parts.operator.request_close_loop();

    // Output below reference: the period grows to the longest allowed
    signals.reference_pu.store(0.8);
    signals.feedback_pu.store(0.7);
    let mut last = None;
    for _ in 0..500 {
        last = parts.control.run(&mut hal);
    }
    assert_eq!(last.map(|c| c.period_ticks), Some(1200));

    // Output above reference: back to the shortest allowed
    signals.feedback_pu.store(0.9);
    for _ in 0..500 {
        last = parts.control.run(&mut hal);
    }
    assert_eq!(last.map(|c| c.period_ticks), Some(300));
}

// =============================================================================
// Monitoring
// =============================================================================

#[test]
fn test_measurements_are_published() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert_eq!(parts.monitor.run(&mut hal), None);
    let m = parts.operator.measurements();
    assert!((m.v_secondary_volts - 350.0).abs() < 1e-3, "{:?}", m);
    assert!((m.v_primary_volts - 400.0).abs() < 1e-3, "{:?}", m);
    // Mid-scale current is the calibration intercept only
    assert!(m.i_primary_amps.abs() < 1.1, "{:?}", m);
}

#[test]
fn test_default_averaging_converges() {
    let cfg = ConverterConfig {
        timing: TimerTiming::plain(TIMER_CLOCK_HZ),
        ..ConverterConfig::default()
    };
    let session = ControlSession::new(cfg).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts.monitor.run(&mut hal);
    assert!(parts.operator.measurements().v_secondary_volts < 10.0);

    for _ in 0..1000 {
        parts.monitor.run(&mut hal);
    }
    let v = parts.operator.measurements().v_secondary_volts;
    assert!((v - 350.0).abs() < 0.5, "v_secondary = {}", v);
}

#[test]
fn test_reference_slews_toward_target() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    // 100 V/s at 10 kHz
    for _ in 0..10 {
        parts.monitor.run(&mut hal);
    }
    assert!((parts.monitor.reference() - 0.1).abs() < 1e-4);

    let pu = session.shared().signals.reference_pu.load();
    assert!((pu - 0.1 / sense::V_SECONDARY_VOLTS).abs() < 1e-6);
}

#[test]
fn test_current_mode_reference_uses_current_slew() {
    let cfg = ConverterConfig {
        mode: ControlMode::Current,
        ..bench_config()
    };
    let session = ControlSession::new(cfg).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    parts
        .operator
        .set_current_reference(5.0)
        .expect("valid reference");
    // 10 A/s at 10 kHz
    for _ in 0..100 {
        parts.monitor.run(&mut hal);
    }
    assert!((parts.monitor.reference() - 0.1).abs() < 1e-4);
}

// =============================================================================
// Protection
// =============================================================================

#[test]
fn test_hardware_fault_trips_and_forces_safe_output_once() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    hal.faults.gate_driver_fault = true;
    assert_eq!(parts.monitor.run(&mut hal), Some(TripCause::GateDriverFault));
    assert_eq!(hal.forced, 1);

    assert_eq!(parts.monitor.run(&mut hal), None);
    assert_eq!(hal.forced, 1, "safe output forced more than once");
    assert_eq!(parts.operator.trip_state(), TripCause::GateDriverFault);
    assert_eq!(parts.monitor.reference(), 0.0);
}

#[test]
fn test_trip_blocks_update_and_control() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    hal.faults.primary_overcurrent = true;
    parts.monitor.run(&mut hal);

    assert!(!parts.update.run(&mut hal));
    assert!(hal.written.is_empty());
    assert!(hal.triggers.is_empty());
    assert_eq!(parts.control.run(&mut hal), None);
}

#[test]
fn test_software_overvoltage_trip() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    // 454.5 V on a 450 V range, above the 450 V limit
    hal.samples.v_secondary = 1.01;
    assert_eq!(
        parts.monitor.run(&mut hal),
        Some(TripCause::SecondaryVoltage)
    );
    assert_eq!(hal.forced, 1);
}

#[test]
fn test_secondary_voltage_read_on_optimal_range() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    hal.samples.v_secondary = 0.95;
    assert_eq!(parts.monitor.run(&mut hal), None);
    let v = parts.operator.measurements().v_secondary_volts;
    assert!((v - 427.5).abs() < 1e-3, "{}", v);
    assert_eq!(parts.operator.trip_state(), TripCause::None);
    assert_eq!(hal.forced, 0);

    // Reference shares the 450 V base with the feedback
    for _ in 1..100 {
        parts.monitor.run(&mut hal);
    }
    assert!((parts.monitor.reference() - 1.0).abs() < 1e-4);
    let signals = &session.shared().signals;
    assert!((signals.reference_pu.load() - 1.0 / 450.0).abs() < 1e-6);
    assert!((signals.feedback_pu.load() - 0.95).abs() < 1e-6);
}

#[test]
fn test_protection_disabled_never_trips() {
    let cfg = ConverterConfig {
        protection_enabled: false,
        ..bench_config()
    };
    let session = ControlSession::new(cfg).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    hal.samples.v_secondary = 1.0;
    hal.faults.gate_driver_fault = true;
    for _ in 0..5 {
        assert_eq!(parts.monitor.run(&mut hal), None);
    }
    assert_eq!(parts.operator.trip_state(), TripCause::None);
    assert_eq!(hal.forced, 0);
    assert!(parts.update.run(&mut hal));
}

#[test]
fn test_trip_clear_refused_while_fault_asserted() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    hal.faults.gate_driver_fault = true;
    parts.monitor.run(&mut hal);

    assert_eq!(parts.operator.request_trip_clear(), TripCause::GateDriverFault);
    parts.monitor.run(&mut hal);
    assert_eq!(parts.operator.trip_state(), TripCause::GateDriverFault);
    assert_eq!(hal.released, 0);

    // The refused request is consumed; a new one is needed after the fault goes
    hal.faults = FaultLines::CLEAR;
    parts.monitor.run(&mut hal);
    assert_eq!(parts.operator.trip_state(), TripCause::GateDriverFault);

    parts.operator.request_trip_clear();
    assert_eq!(parts.monitor.run(&mut hal), None);
    assert_eq!(parts.operator.trip_state(), TripCause::None);
    assert_eq!(hal.released, 1);

    assert!(parts.update.run(&mut hal));
    assert!(parts.control.run(&mut hal).is_some());
}

#[test]
fn test_clear_without_trip_is_noop() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    assert_eq!(parts.operator.request_trip_clear(), TripCause::None);
    parts.monitor.run(&mut hal);
    assert_eq!(hal.released, 0);
}

#[test]
fn test_retrip_after_clear_forces_again() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();

    hal.faults.secondary_overcurrent = true;
    parts.monitor.run(&mut hal);
    hal.faults = FaultLines::CLEAR;
    parts.operator.request_trip_clear();
    parts.monitor.run(&mut hal);
    assert_eq!(hal.forced, 1);

    hal.faults.primary_tank_overcurrent = true;
    assert_eq!(
        parts.monitor.run(&mut hal),
        Some(TripCause::PrimaryTankOvercurrent)
    );
    assert_eq!(hal.forced, 2);
}

#[test]
fn test_compensator_restarts_after_trip() {
    let session = ControlSession::new(bench_config()).expect("valid config");
    let mut parts = session.split();
    let mut hal = MockHal::new();
    let signals = &session.shared().signals;

    parts.operator.request_close_loop();
    signals.reference_pu.store(0.8);
    signals.feedback_pu.store(0.7);
    for _ in 0..500 {
        parts.control.run(&mut hal);
    }
    assert_eq!(parts.control.compensator().last_output(), 2.0);

    hal.faults.gate_driver_fault = true;
    parts.monitor.run(&mut hal);
    parts.control.run(&mut hal);
    hal.faults = FaultLines::CLEAR;
    parts.operator.request_trip_clear();
    parts.monitor.run(&mut hal);

    // History was wiped: one step from zero cannot already be at the limit
    signals.reference_pu.store(0.8);
    signals.feedback_pu.store(0.7);
    parts.control.run(&mut hal);
    assert!(parts.control.compensator().last_output() < 2.0);
    assert_eq!(parts.control.loop_state(), LoopState::Closed);
}

// =============================================================================
// Mailbox Concurrency
// =============================================================================

#[test]
fn test_mailbox_never_returns_torn_command() {
    let mailbox = CommandMailbox::new();
    let uniform = |n: u32| ModulationCommand {
        period_ticks: n,
        duty_primary_a: n,
        duty_primary_b: n,
        duty_secondary_a: n,
        duty_secondary_b: n,
        phase_shift_ticks: n as i32,
        deadband_rising_ticks: n,
        deadband_falling_ticks: n,
    };

    std::thread::scope(|s| {
        s.spawn(|| {
            for n in 1..=20_000 {
                mailbox.publish(&uniform(n));
            }
        });
        s.spawn(|| {
            let mut previous = 0;
            for _ in 0..20_000 {
                let c = mailbox.latest();
                assert_eq!(c, uniform(c.period_ticks), "torn read");
                assert!(c.period_ticks >= previous, "went backwards");
                previous = c.period_ticks;
            }
        });
    });

    assert_eq!(mailbox.latest(), uniform(20_000));
}
