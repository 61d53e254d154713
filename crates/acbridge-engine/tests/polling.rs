mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use acbridge_core::config::ControllerConfig;
use acbridge_core::types::Id;
use acbridge_devices::transports::{Fault, MemoryBus};
use acbridge_devices::{Entity, EntityState, RegisterConfig, RegisterType, Sensor, Switch, ValueType};

use common::{config, controller, sensor};

async fn seeded_bus() -> Arc<MemoryBus> {
    let bus = Arc::new(MemoryBus::new());
    bus.set_words("20.00.00", 0x4200, &[1, 2, 3, 4, 5, 6, 7, 8]).await;
    bus
}

async fn register_block(controller: &acbridge_engine::ModbusController) -> Vec<Arc<Sensor>> {
    let mut sensors = Vec::new();
    for i in 0..8u16 {
        let s = sensor(&format!("s{}", i), "20.00.00", 0x4200 + i);
        controller.register_sensor(s.clone()).await.unwrap();
        sensors.push(s);
    }
    sensors
}

async fn states(sensors: &[Arc<Sensor>]) -> Vec<EntityState> {
    let mut out = Vec::new();
    for s in sensors {
        out.push(s.state().await);
    }
    out
}

#[test_log::test(tokio::test)]
async fn coalescing_issues_fewer_reads_with_identical_results() {
    let plain_bus = seeded_bus().await;
    let plain = controller(&plain_bus, config(false));
    let plain_sensors = register_block(&plain).await;
    let plain_report = plain.poll_once().await.unwrap();

    let merged_bus = seeded_bus().await;
    let merged = controller(&merged_bus, config(true));
    let merged_sensors = register_block(&merged).await;
    let merged_report = merged.poll_once().await.unwrap();

    assert_eq!(plain_report.reads, 8);
    assert_eq!(plain_bus.read_count(), 8);
    assert_eq!(merged_report.reads, 1);
    assert_eq!(merged_bus.read_count(), 1);
    assert_eq!(plain_report.updated, merged_report.updated);

    let expected: Vec<EntityState> = (1..=8).map(|v| EntityState::Number(f64::from(v))).collect();
    assert_eq!(states(&plain_sensors).await, expected);
    assert_eq!(states(&merged_sensors).await, expected);
}

#[tokio::test]
async fn coalesced_mixed_value_types_decode_like_single_reads() {
    let bus = Arc::new(MemoryBus::new());
    bus.set_words("20.00.00", 0x10, &[0x0001, 0x0002, 0xFFF6, 0x00FF]).await;

    let make = |bus: &Arc<MemoryBus>, coalesce: bool| controller(bus, config(coalesce));
    for coalesce in [false, true] {
        let controller = make(&bus, coalesce);
        let swapped = Arc::new(Sensor::new(
            Id::from("swapped"),
            "swapped",
            RegisterConfig::new("20.00.00", 0x10).with_value_type(ValueType::UnsignedDWordSwapped),
        ));
        let signed = Arc::new(Sensor::new(
            Id::from("signed"),
            "signed",
            RegisterConfig::new("20.00.00", 0x12)
                .with_value_type(ValueType::SignedWord)
                .with_multiplier(0.1),
        ));
        let masked = Arc::new(Sensor::new(
            Id::from("masked"),
            "masked",
            RegisterConfig::new("20.00.00", 0x13)
                .with_bitmask(0x0F)
                .with_multiplier(2.0)
                .with_offset(1.0),
        ));
        controller.register_sensor(swapped.clone()).await.unwrap();
        controller.register_sensor(signed.clone()).await.unwrap();
        controller.register_sensor(masked.clone()).await.unwrap();

        let report = controller.poll_once().await.unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(swapped.state().await, EntityState::Number(f64::from(0x0002_0001u32)));
        assert_eq!(signed.state().await, EntityState::Number(-1.0));
        assert_eq!(masked.state().await, EntityState::Number(31.0));
    }
}

#[tokio::test]
async fn timeout_on_one_register_does_not_block_others() {
    let bus = Arc::new(MemoryBus::new());
    bus.set_word("20.00.00", 0x10, 10).await;
    bus.set_word("20.00.00", 0x20, 20).await;
    bus.set_word("20.00.00", 0x30, 30).await;
    bus.inject_fault("20.00.00", 0x20, Fault::Delay(Duration::from_secs(5))).await;

    let controller = controller(
        &bus,
        ControllerConfig {
            register_timeout: Duration::from_millis(100),
            ..ControllerConfig::default()
        },
    );
    let first = sensor("first", "20.00.00", 0x10);
    let slow = sensor("slow", "20.00.00", 0x20);
    let last = sensor("last", "20.00.00", 0x30);
    for s in [&first, &slow, &last] {
        controller.register_sensor(s.clone()).await.unwrap();
    }

    let started = Instant::now();
    let report = controller.poll_once().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(report.reads, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(first.state().await, EntityState::Number(10.0));
    assert_eq!(slow.state().await, EntityState::Unavailable);
    assert_eq!(last.state().await, EntityState::Number(30.0));
}

#[tokio::test]
async fn timeout_inside_merged_range_only_fails_that_register() {
    let bus = Arc::new(MemoryBus::new());
    bus.set_words("20.00.00", 0x10, &[1, 2, 3]).await;
    bus.inject_fault("20.00.00", 0x11, Fault::Delay(Duration::from_secs(5))).await;

    let mut results = Vec::new();
    for coalesce in [false, true] {
        let controller = controller(
            &bus,
            ControllerConfig {
                coalesce,
                register_timeout: Duration::from_millis(50),
                ..ControllerConfig::default()
            },
        );
        let sensors = [
            sensor("low", "20.00.00", 0x10),
            sensor("slow", "20.00.00", 0x11),
            sensor("high", "20.00.00", 0x12),
        ];
        for s in &sensors {
            controller.register_sensor(s.clone()).await.unwrap();
        }

        let started = Instant::now();
        let report = controller.poll_once().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 1);
        results.push(states(&sensors).await);
    }

    let expected = vec![EntityState::Number(1.0), EntityState::Unavailable, EntityState::Number(3.0)];
    assert_eq!(results[0], expected);
    assert_eq!(results[1], expected);
}

#[tokio::test]
async fn failed_batch_only_fails_its_entities() {
    let bus = Arc::new(MemoryBus::new());
    bus.set_words("20.00.00", 0x10, &[1, 2]).await;
    bus.set_words("20.00.01", 0x10, &[3, 4]).await;
    bus.inject_fault("20.00.01", 0x11, Fault::Error("crc mismatch".into())).await;

    let controller = controller(&bus, config(true));
    let healthy = [sensor("a0", "20.00.00", 0x10), sensor("a1", "20.00.00", 0x11)];
    let broken = [sensor("b0", "20.00.01", 0x10), sensor("b1", "20.00.01", 0x11)];
    for s in healthy.iter().chain(broken.iter()) {
        controller.register_sensor(s.clone()).await.unwrap();
    }

    // the merged read of 20.00.01 fails and is retried register by register
    let report = controller.poll_once().await.unwrap();
    assert_eq!(report.reads, 4);
    assert_eq!(report.updated, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(healthy[1].state().await, EntityState::Number(2.0));
    assert_eq!(broken[0].state().await, EntityState::Number(3.0));
    assert_eq!(broken[1].state().await, EntityState::Unavailable);

    // the next tick recovers
    bus.clear_faults().await;
    let report = controller.poll_once().await.unwrap();
    assert_eq!(report.reads, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(broken[1].state().await, EntityState::Number(4.0));
}

#[tokio::test]
async fn short_read_marks_only_uncovered_entity() {
    let bus = Arc::new(MemoryBus::new());
    bus.set_words("20.00.00", 0x10, &[1, 2]).await;
    bus.inject_fault("20.00.00", 0x10, Fault::Short).await;

    let controller = controller(&bus, config(true));
    let a = sensor("a", "20.00.00", 0x10);
    let b = sensor("b", "20.00.00", 0x11);
    controller.register_sensor(a.clone()).await.unwrap();
    controller.register_sensor(b.clone()).await.unwrap();

    let report = controller.poll_once().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(a.state().await, EntityState::Number(1.0));
    assert_eq!(b.state().await, EntityState::Unavailable);
}

#[tokio::test]
async fn coils_publish_booleans() {
    let bus = Arc::new(MemoryBus::new());
    bus.set_bit("20.00.00", 0x4000, true).await;
    bus.set_bit("20.00.00", 0x4001, false).await;

    let controller = controller(&bus, config(true));
    let power = Arc::new(Switch::new(
        Id::from("power"),
        "Power",
        RegisterConfig::new("20.00.00", 0x4000)
            .with_register_type(RegisterType::Coil)
            .with_multiplier(10.0),
    ));
    let other = Arc::new(Switch::new(
        Id::from("other"),
        "Other",
        RegisterConfig::new("20.00.00", 0x4001).with_register_type(RegisterType::Coil),
    ));
    controller.register_switch(power.clone()).await.unwrap();
    controller.register_switch(other.clone()).await.unwrap();

    let report = controller.poll_once().await.unwrap();
    assert_eq!(report.reads, 1);
    assert_eq!(power.state().await, EntityState::Bool(true));
    assert_eq!(other.state().await, EntityState::Bool(false));

    power.write_state(false).await.unwrap();
    assert_eq!(bus.bit("20.00.00", 0x4000).await, Some(false));
}

#[tokio::test]
async fn run_polls_until_shutdown() {
    let bus = seeded_bus().await;
    let controller = controller(
        &bus,
        ControllerConfig {
            update_interval: Duration::from_millis(20),
            ..ControllerConfig::default()
        },
    );
    let s = sensor("s0", "20.00.00", 0x4200);
    controller.register_sensor(s.clone()).await.unwrap();
    let mut events = controller.subscribe();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let runner = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run(async move {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.entity_id, Id::from("s0"));
    assert_eq!(event.new_state, EntityState::Number(1.0));

    tokio::time::sleep(Duration::from_millis(70)).await;
    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(bus.read_count() >= 2);
}
