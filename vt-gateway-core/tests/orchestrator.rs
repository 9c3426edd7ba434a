mod common;

use common::{addr, connected_harness, harness};
use vt_gateway_core::views::{CurrentTestConfig, ValveConfig};
use vt_gateway_error::SyncError;
use vt_gateway_sdk::{DeviceError, DeviceValue, Parameter};

#[tokio::test]
async fn read_parameter_decodes_and_reports_type() {
    let h = connected_harness().await;
    h.device.set(addr(1, "AllgemeineParameter", "Fehlerbit"), DeviceValue::Byte(4));

    let p = h
        .orchestrator
        .read_parameter(1, "AllgemeineParameter", "fehlerbit")
        .await
        .unwrap();
    assert_eq!(p.name, "fehlerbit");
    assert_eq!(p.value, "4");
    assert_eq!(p.data_type.as_deref(), Some("Byte"));
}

#[tokio::test]
async fn read_parameter_error_kinds() {
    let h = harness();
    // Mapped but link down.
    assert_eq!(
        h.orchestrator.read_parameter(1, "AllgemeineParameter", "Fehlerbit").await,
        Err(SyncError::DeviceUnavailable)
    );
    // Configuration errors win over link state.
    assert_eq!(
        h.orchestrator.read_parameter(3, "AllgemeineParameter", "Fehlerbit").await,
        Err(SyncError::NoMappingForBlock { block: 3 })
    );
    assert!(matches!(
        h.orchestrator.read_parameter(1, "AllgemeineParameter", "Nope").await,
        Err(SyncError::ParameterNotFound { .. })
    ));
}

#[tokio::test]
async fn subgroup_reads_fall_back_to_top_level() {
    let h = connected_harness().await;
    h.device.set(addr(2, "Konfiguration_Detailtest", "Messdauer"), DeviceValue::Int16(250));

    let p = h
        .orchestrator
        .read_parameter(2, "Konfiguration_Detailtest/Strom", "Messdauer")
        .await
        .unwrap();
    assert_eq!(p.value, "250");
}

#[tokio::test]
async fn write_parameter_encodes_with_metadata() {
    let h = connected_harness().await;
    h.orchestrator
        .write_parameter(1, "Ventilkonfiguration", "PWMHalten", "40")
        .await
        .unwrap();
    h.orchestrator
        .write_parameter(1, "Daten_Strommessung/Ventil1", "Strom", "1, 2, 3")
        .await
        .unwrap();

    assert_eq!(
        h.device.value(&addr(1, "Ventilkonfiguration", "PWMHalten")),
        Some(DeviceValue::Int16(40))
    );
    assert_eq!(
        h.device.value(&addr(1, "Daten_Strommessung/Ventil1", "Strom")),
        Some(DeviceValue::Array(vec![
            DeviceValue::Int16(1),
            DeviceValue::Int16(2),
            DeviceValue::Int16(3)
        ]))
    );
}

#[tokio::test]
async fn read_group_is_all_or_nothing() {
    let h = connected_harness().await;
    let group = "Ventilkonfiguration";
    h.device.set(addr(1, group, "VentilAnzahlInVerwendung"), DeviceValue::Int16(16));
    h.device.set(addr(1, group, "PWMHalten"), DeviceValue::Int16(30));
    h.device.set(addr(1, group, "KonfigUebernehmen"), DeviceValue::Boolean(false));

    let params = h.orchestrator.read_group(1, group).await.unwrap();
    let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["VentilAnzahlInVerwendung", "PWMHalten", "KonfigUebernehmen"]);

    h.device.fail_reads(
        addr(1, group, "PWMHalten"),
        DeviceError::Rejected {
            address: "x".into(),
            status: "BadNotReadable".into(),
        },
    );
    assert!(matches!(
        h.orchestrator.read_group(1, group).await,
        Err(SyncError::ReadFailed(_))
    ));
    // A rejected node leaves the session up.
    assert!(h.link.is_connected());

    assert!(matches!(
        h.orchestrator.read_group(1, "Unbekannt").await,
        Err(SyncError::GroupNotFound { .. })
    ));
}

#[tokio::test]
async fn write_group_attempts_every_mapped_value() {
    let h = connected_harness().await;
    let values = [
        Parameter::new("VentilAnzahlInVerwendung", "8"),
        Parameter::new("GibtEsNicht", "1"),
        Parameter::new("PWMHalten", "25"),
    ];

    let report = h
        .orchestrator
        .write_group(1, "Ventilkonfiguration", &values)
        .await
        .unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.written, ["VentilAnzahlInVerwendung", "PWMHalten"]);
    assert_eq!(report.unmatched, ["GibtEsNicht"]);
    assert_eq!(h.device.writes().len(), 2);
}

#[tokio::test]
async fn group_reads_and_writes_share_one_entry_set() {
    let h = connected_harness().await;
    let group = "Konfiguration_Detailtest/Strom";
    h.device.set(addr(1, group, "StrommessungAktiv"), DeviceValue::Boolean(false));
    h.device.set(addr(1, group, "StrommessungMessdauer"), DeviceValue::Int16(100));
    h.device.set(addr(1, "Konfiguration_Detailtest", "Messdauer"), DeviceValue::Int16(7));

    let names: Vec<_> = h
        .orchestrator
        .read_group(1, group)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["StrommessungAktiv", "StrommessungMessdauer"]);

    // Messdauer only exists in the top-level group, so the subgroup write skips it.
    let report = h
        .orchestrator
        .write_group(
            1,
            group,
            &[
                Parameter::new("Messdauer", "9"),
                Parameter::new("strommessungaktiv", "true"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.unmatched, ["Messdauer"]);
    assert_eq!(report.written, ["strommessungaktiv"]);
    assert_eq!(
        h.device.value(&addr(1, "Konfiguration_Detailtest", "Messdauer")),
        Some(DeviceValue::Int16(7))
    );

    // An unmapped subgroup reads and writes its top-level group as a whole.
    let fallback = "Konfiguration_Detailtest/Kraft";
    let names: Vec<_> = h
        .orchestrator
        .read_group(1, fallback)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["Messdauer"]);
    let report = h
        .orchestrator
        .write_group(1, fallback, &[Parameter::new("Messdauer", "12")])
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(
        h.device.value(&addr(1, "Konfiguration_Detailtest", "Messdauer")),
        Some(DeviceValue::Int16(12))
    );
}

#[tokio::test]
async fn write_group_reports_device_refusals() {
    let h = connected_harness().await;
    let group = "Ventilkonfiguration";
    h.device.filter_writes(addr(1, group, "PWMHalten"), |_| false);
    let report = h
        .orchestrator
        .write_group(
            1,
            group,
            &[
                Parameter::new("PWMHalten", "1"),
                Parameter::new("KonfigUebernehmen", "true"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.failed, ["PWMHalten"]);
    assert_eq!(report.written, ["KonfigUebernehmen"]);
    assert_eq!(
        h.device.value(&addr(1, group, "KonfigUebernehmen")),
        Some(DeviceValue::Boolean(true))
    );
}

#[tokio::test]
async fn exact_command_name_wins() {
    let h = connected_harness().await;
    h.orchestrator
        .execute_command(1, "Langzeittest", "Start", None)
        .await
        .unwrap();

    let writes = h.device.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, addr(1, "Kommandos", "Langzeittest_Start"));
    assert_eq!(writes[0].1, DeviceValue::Int32(1));
}

#[tokio::test]
async fn command_payload_goes_to_selector_first() {
    let h = connected_harness().await;
    h.orchestrator
        .execute_command(2, "Langzeittest", "Stop", Some("7"))
        .await
        .unwrap();

    let writes = h.device.writes();
    assert_eq!(
        writes,
        vec![
            (addr(2, "Kommandos", "Ventilnummer"), DeviceValue::Int16(7)),
            (addr(2, "Kommandos", "Langzeittest_Stop"), DeviceValue::Int32(1)),
        ]
    );
}

#[tokio::test]
async fn trigger_tries_int_then_bool_then_text() {
    let h = connected_harness().await;
    let trigger = addr(1, "Kommandos", "Langzeittest_Start");
    h.device
        .filter_writes(trigger.clone(), |v| matches!(v, DeviceValue::Boolean(true)));

    h.orchestrator
        .execute_command(1, "Langzeittest", "Start", None)
        .await
        .unwrap();
    assert_eq!(
        h.device.writes_to(&trigger),
        vec![DeviceValue::Int32(1), DeviceValue::Boolean(true)]
    );

    h.device.filter_writes(trigger.clone(), |_| false);
    let err = h
        .orchestrator
        .execute_command(1, "Langzeittest", "Start", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::WriteFailed(_)));
    assert_eq!(h.device.writes_to(&trigger).len(), 2 + 3);
    assert_eq!(
        h.device.writes_to(&trigger).last(),
        Some(&DeviceValue::String("Start".into()))
    );
}

#[tokio::test]
async fn unmatched_commands_are_reported() {
    let h = connected_harness().await;
    let err = h
        .orchestrator
        .execute_command(1, "Langzeittest", "Pause", Some("3"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SyncError::CommandNotMapped {
            block: 1,
            test_type: "Langzeittest".into(),
            action: "Pause".into(),
        }
    );

    // Suffix-only match when nothing better exists.
    h.orchestrator
        .execute_command(1, "Einzeltest", "Reset", None)
        .await
        .unwrap();
    assert_eq!(
        h.device.writes().last().map(|(a, _)| a.clone()),
        Some(addr(1, "Kommandos", "Detailtest_Reset"))
    );
}

#[tokio::test]
async fn failed_payload_aborts_the_command() {
    let h = connected_harness().await;
    h.device
        .filter_writes(addr(1, "Kommandos", "Ventilnummer"), |_| false);
    let err = h
        .orchestrator
        .execute_command(1, "Langzeittest", "Start", Some("2"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::WriteFailed(_)));
    assert!(h
        .device
        .writes_to(&addr(1, "Kommandos", "Langzeittest_Start"))
        .is_empty());
}

#[tokio::test]
async fn typed_views_round_trip_through_groups() {
    let h = connected_harness().await;
    let shape = ValveConfig {
        valves_in_use: Some(12),
        pwm_hold: Some(35),
        apply: Some(true),
        ..Default::default()
    };
    let report = h.orchestrator.write_group_from(1, &shape).await.unwrap();
    assert!(report.is_complete());

    let view = h.orchestrator.read_group_as::<ValveConfig>(1).await.unwrap();
    assert_eq!(view.value, shape);
    assert!(view.unmatched.is_empty());

    h.device.set(
        addr(1, "Konfiguration_Detailtest/Strom", "StrommessungAktiv"),
        DeviceValue::Boolean(true),
    );
    h.device.set(
        addr(1, "Konfiguration_Detailtest/Strom", "StrommessungMessdauer"),
        DeviceValue::Int16(900),
    );
    let view = h
        .orchestrator
        .read_group_as::<CurrentTestConfig>(1)
        .await
        .unwrap();
    assert_eq!(view.value.active, Some(true));
    assert_eq!(view.value.duration, Some(900));
}

#[tokio::test]
async fn read_block_lists_unreadable_groups() {
    let h = connected_harness().await;
    let group = "Ventilkonfiguration";
    h.device.set(addr(1, group, "VentilAnzahlInVerwendung"), DeviceValue::Int16(16));
    h.device.set(addr(1, group, "PWMHalten"), DeviceValue::Int16(30));
    h.device.set(addr(1, group, "KonfigUebernehmen"), DeviceValue::Boolean(false));

    let data = h.orchestrator.read_block(1).await.unwrap();
    assert_eq!(data.groups.len(), 1);
    assert_eq!(data.groups[0].key, group);
    assert!(data.unavailable.contains(&"AllgemeineParameter".to_string()));

    let groups = h.orchestrator.block_groups(1).unwrap();
    assert_eq!(groups.len(), 7);
    assert!(h.orchestrator.block_groups(4).is_err());
}
