//! Tests for the simulated devices, driven directly through the `Hal` trait

use relay_hal::{
    Device, DeviceCommand, DeviceStatus, DiskCommand, DiskOpKind, Hal, HalError, TermCommand,
};
use relay_hal_sim::{DiskSpec, SimConfig, SimHal, DISK_STATUS_ERROR};

fn small_machine() -> SimHal {
    SimHal::new(SimConfig {
        disks: vec![DiskSpec {
            tracks: 2,
            sectors_per_track: 4,
            sector_size: 8,
        }],
        terminals: 1,
        clock_period_ms: None,
    })
}

fn disk(hal: &SimHal, cmd: DiskCommand) -> DeviceStatus {
    hal.device_output(Device::Disk(0), DeviceCommand::Disk(cmd)).unwrap();
    hal.wait_device(Device::Disk(0)).unwrap()
}

#[test]
fn test_disk_steps_echo_kind() {
    let hal = small_machine();
    assert_eq!(
        disk(&hal, DiskCommand::Seek { track: 1 }),
        DeviceStatus::Disk {
            kind: DiskOpKind::Seek,
            status: 0,
            data: None
        }
    );
    assert_eq!(
        disk(
            &hal,
            DiskCommand::Write {
                sector: 3,
                data: vec![7; 8]
            }
        ),
        DeviceStatus::Disk {
            kind: DiskOpKind::Write,
            status: 0,
            data: None
        }
    );
    assert_eq!(
        disk(&hal, DiskCommand::Read { sector: 3 }),
        DeviceStatus::Disk {
            kind: DiskOpKind::Read,
            status: 0,
            data: Some(vec![7; 8])
        }
    );
    assert_eq!(hal.sector(0, 1, 3), Some(vec![7; 8]));
    assert_eq!(hal.sector(0, 0, 3), Some(vec![0; 8]));
    assert_eq!(hal.disk_steps(0), 3);
}

#[test]
fn test_disk_out_of_range_reports_error_status() {
    let hal = small_machine();
    match disk(&hal, DiskCommand::Seek { track: 9 }) {
        DeviceStatus::Disk { status, .. } => assert_eq!(status, DISK_STATUS_ERROR),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_disk_write_wrong_length_rejected() {
    let hal = small_machine();
    let r = hal.device_output(
        Device::Disk(0),
        DeviceCommand::Disk(DiskCommand::Write {
            sector: 0,
            data: vec![1; 3],
        }),
    );
    assert_eq!(r, Err(HalError::InvalidArgument));
}

#[test]
fn test_fail_next_disk_op_is_one_shot() {
    let hal = small_machine();
    hal.fail_next_disk_op_with(0, 5);
    match disk(&hal, DiskCommand::Seek { track: 0 }) {
        DeviceStatus::Disk { kind, status, .. } => {
            assert_eq!(kind, DiskOpKind::Seek);
            assert_eq!(status, 5);
        }
        other => panic!("unexpected {:?}", other),
    }
    match disk(&hal, DiskCommand::Seek { track: 0 }) {
        DeviceStatus::Disk { status, .. } => assert_eq!(status, 0),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_terminal_input_held_until_enabled() {
    let hal = small_machine();
    hal.feed_terminal(0, b"hi");
    hal.device_output(
        Device::Terminal(0),
        DeviceCommand::Terminal(TermCommand::EnableReceive),
    )
    .unwrap();

    for expected in b"hi" {
        assert_eq!(
            hal.wait_device(Device::Terminal(0)).unwrap(),
            DeviceStatus::Terminal {
                received: Some(*expected),
                xmit_ready: false
            }
        );
    }
}

#[test]
fn test_terminal_transmit_captured() {
    let hal = small_machine();
    for &b in b"ok\n" {
        hal.device_output(
            Device::Terminal(0),
            DeviceCommand::Terminal(TermCommand::Transmit(b)),
        )
        .unwrap();
        assert_eq!(
            hal.wait_device(Device::Terminal(0)).unwrap(),
            DeviceStatus::Terminal {
                received: None,
                xmit_ready: true
            }
        );
    }
    assert_eq!(hal.terminal_output(0), b"ok\n".to_vec());
}

#[test]
fn test_command_must_match_device() {
    let hal = small_machine();
    let r = hal.device_output(
        Device::Terminal(0),
        DeviceCommand::Disk(DiskCommand::Seek { track: 0 }),
    );
    assert_eq!(r, Err(HalError::InvalidArgument));
    assert_eq!(
        hal.wait_device(Device::Disk(3)),
        Err(HalError::NoSuchDevice)
    );
    assert_eq!(hal.disk_info(1), Err(HalError::NoSuchDevice));
}

#[test]
fn test_manual_clock_and_abort() {
    let hal = small_machine();
    hal.tick_n(2);
    assert_eq!(hal.wait_device(Device::Clock), Ok(DeviceStatus::Clock));
    hal.abort_device(Device::Clock);
    assert_eq!(hal.wait_device(Device::Clock), Ok(DeviceStatus::Clock));
    assert_eq!(hal.wait_device(Device::Clock), Err(HalError::Aborted));
}

#[test]
fn test_periodic_clock_ticks() {
    let hal = SimHal::new(SimConfig {
        clock_period_ms: Some(1),
        ..SimConfig::default()
    });
    assert_eq!(hal.wait_device(Device::Clock), Ok(DeviceStatus::Clock));
    hal.abort_device(Device::Clock);
}

#[test]
fn test_spurious_interrupt_latched() {
    let hal = small_machine();
    let status = DeviceStatus::Disk {
        kind: DiskOpKind::Read,
        status: 0,
        data: None,
    };
    hal.raise_spurious(Device::Disk(0), status.clone());
    assert_eq!(hal.wait_device(Device::Disk(0)), Ok(status));
}

#[test]
fn test_debug_log_capture() {
    let hal = small_machine();
    hal.debug_write("disk0: halted");
    assert!(hal.has_log_containing("halted"));
    assert_eq!(hal.get_debug_log().len(), 1);
    hal.clear_debug_log();
    assert!(hal.get_debug_log().is_empty());
}

#[test]
fn test_geometry() {
    let hal = SimHal::manual();
    assert_eq!(hal.disk_units(), 2);
    assert_eq!(hal.terminal_units(), 4);
    let info = hal.disk_info(0).unwrap();
    assert_eq!(info.sector_size, 512);
    assert_eq!(info.sectors_per_track, 16);
}

#[test]
fn test_paused_disk_holds_completions_until_resume() {
    let hal = std::sync::Arc::new(small_machine());
    hal.pause_disk(0);
    hal.device_output(Device::Disk(0), DeviceCommand::Disk(DiskCommand::Seek { track: 1 }))
        .unwrap();

    let waiter = {
        let hal = std::sync::Arc::clone(&hal);
        std::thread::spawn(move || hal.wait_device(Device::Disk(0)))
    };
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(!waiter.is_finished());
    assert_eq!(hal.disk_steps(0), 1);

    hal.resume_disk(0);
    assert!(matches!(
        waiter.join().unwrap(),
        Ok(DeviceStatus::Disk {
            kind: DiskOpKind::Seek,
            status: 0,
            ..
        })
    ));

    // No longer paused
    assert!(matches!(
        disk(&hal, DiskCommand::Read { sector: 0 }),
        DeviceStatus::Disk { status: 0, .. }
    ));
}
