//! Typed views of named configuration groups.
//!
//! Each shape carries an explicit table from normalized parameter name to a
//! setter and getter, built once on first use. Parameters that match no field
//! and values that do not parse are reported back rather than dropped.

use crate::codec::{parse_bool, parse_int};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use vt_gateway_sdk::Parameter;

/// Keeps ASCII alphanumerics only, lower-cased: `PWM_Halten` -> `pwmhalten`.
pub fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Lenient text conversion for view fields.
pub trait FieldValue: Sized {
    fn parse_field(raw: &str) -> Option<Self>;
    fn format_field(&self) -> String;
}

impl FieldValue for bool {
    fn parse_field(raw: &str) -> Option<Self> {
        parse_bool(raw.trim())
    }

    fn format_field(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for u8 {
    fn parse_field(raw: &str) -> Option<Self> {
        parse_int(raw.trim())
    }

    fn format_field(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for i32 {
    /// Integer text, or decimal text truncated toward zero.
    fn parse_field(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        parse_int(raw).or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && *f >= i32::MIN as f64 && *f <= i32::MAX as f64)
                .map(|f| f.trunc() as i32)
        })
    }

    fn format_field(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for f64 {
    fn parse_field(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn format_field(&self) -> String {
        self.to_string()
    }
}

pub struct Field<T> {
    pub name: &'static str,
    pub set: fn(&mut T, &str) -> bool,
    pub get: fn(&T) -> Option<String>,
}

pub struct FieldTable<T> {
    fields: Vec<Field<T>>,
    index: HashMap<String, usize>,
}

impl<T> FieldTable<T> {
    pub fn new(fields: Vec<Field<T>>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (normalize_key(f.name), i))
            .collect();
        Self { fields, index }
    }

    pub fn get(&self, name: &str) -> Option<&Field<T>> {
        self.index
            .get(&normalize_key(name))
            .and_then(|i| self.fields.get(*i))
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }
}

/// A populated shape plus what did not fit into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView<T> {
    pub value: T,
    /// Parameters with no matching field.
    pub unmatched: Vec<String>,
    /// Parameters whose value did not parse as the field's type.
    pub invalid: Vec<String>,
}

pub trait GroupShape: Default + Sized + Send + Sync + 'static {
    /// Group key the shape is read from and written to.
    const GROUP: &'static str;

    fn fields() -> &'static FieldTable<Self>;

    fn populate(params: &[Parameter]) -> GroupView<Self> {
        let table = Self::fields();
        let mut view = GroupView::<Self>::default();
        for p in params {
            match table.get(&p.name) {
                Some(field) => {
                    if !(field.set)(&mut view.value, &p.value) {
                        view.invalid.push(p.name.clone());
                    }
                }
                None => view.unmatched.push(p.name.clone()),
            }
        }
        view
    }

    /// Set fields as `(parameter name, text)` pairs, in table order.
    fn to_parameters(&self) -> Vec<Parameter> {
        Self::fields()
            .fields()
            .iter()
            .filter_map(|f| (f.get)(self).map(|v| Parameter::new(f.name, v)))
            .collect()
    }
}

macro_rules! group_shape {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $group:literal {
            $( $field:ident : $ty:ty => $param:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        #[serde(rename_all = "camelCase")]
        $vis struct $name {
            $( pub $field: Option<$ty>, )*
        }

        impl GroupShape for $name {
            const GROUP: &'static str = $group;

            fn fields() -> &'static FieldTable<Self> {
                static TABLE: Lazy<FieldTable<$name>> = Lazy::new(|| {
                    FieldTable::new(vec![
                        $(
                            Field {
                                name: $param,
                                set: |shape: &mut $name, raw: &str| {
                                    match <$ty as FieldValue>::parse_field(raw) {
                                        Some(v) => {
                                            shape.$field = Some(v);
                                            true
                                        }
                                        None => false,
                                    }
                                },
                                get: |shape: &$name| shape.$field.as_ref().map(FieldValue::format_field),
                            },
                        )*
                    ])
                });
                &TABLE
            }
        }
    };
}

group_shape! {
    /// Scaling and error state shared by a block.
    pub struct GeneralConfig in "AllgemeineParameter" {
        pressure_scale_min: f64 => "SkalierungDruckmessungMin",
        pressure_scale_max: f64 => "SkalierungDruckmessungMax",
        flow_scale_min: f64 => "SkalierungDurchflussmessungMin",
        flow_scale_max: f64 => "SkalierungDurchflussmessungMax",
        error_bits: u8 => "Fehlerbit",
    }
}

group_shape! {
    /// Valve count, lockout mask and PWM drive profile.
    pub struct ValveConfig in "Ventilkonfiguration" {
        valves_in_use: i32 => "VentilAnzahlInVerwendung",
        valve_lock: u8 => "VentilSperre",
        pwm_excitation: i32 => "PWMAnregung",
        pwm_excitation_time: i32 => "PWMAnregungszeit",
        pwm_intermediate: i32 => "PWMZwischenerregung",
        pwm_intermediate_time: i32 => "PWMZwischenerregungszeit",
        pwm_hold: i32 => "PWMHalten",
        apply: bool => "KonfigUebernehmen",
    }
}

group_shape! {
    pub struct LongRunConfig in "Konfiguration_Langzeittest" {
        open_time: i32 => "OeffnungszeitVentil",
        pause_time: i32 => "PausenzeitVentil",
        start_offset_1: i32 => "OffsetStartVentil1",
        start_offset_2: i32 => "OffsetStartVentil2",
        start_offset_3: i32 => "OffsetStartVentil3",
        start_offset_4: i32 => "OffsetStartVentil4",
        start_offset_5: i32 => "OffsetStartVentil5",
        start_offset_6: i32 => "OffsetStartVentil6",
        start_offset_7: i32 => "OffsetStartVentil7",
        start_offset_8: i32 => "OffsetStartVentil8",
        start_offset_9: i32 => "OffsetStartVentil9",
        start_offset_10: i32 => "OffsetStartVentil10",
        start_offset_11: i32 => "OffsetStartVentil11",
        start_offset_12: i32 => "OffsetStartVentil12",
        start_offset_13: i32 => "OffsetStartVentil13",
        start_offset_14: i32 => "OffsetStartVentil14",
        start_offset_15: i32 => "OffsetStartVentil15",
        start_offset_16: i32 => "OffsetStartVentil16",
        total_strokes: f64 => "AnzahlGesamtSchlagzahlen",
        detail_strokes: f64 => "AnzahlSchlagzahlenDetailtest",
        pressure_setpoint: i32 => "DruckregelungDruckSollwert",
        pressure_setpoint_max: i32 => "DruckregelungDruckSollwertMax",
        pressure_setpoint_min: i32 => "DruckregelungDruckSollwertMin",
    }
}

group_shape! {
    pub struct CurrentTestConfig in "Konfiguration_Detailtest/Strom" {
        active: bool => "StrommessungAktiv",
        pressure_setpoint: i32 => "StrommessungSollwertDruck",
        pressure_setpoint_max: i32 => "StrommessungSollwertDruckMax",
        pressure_setpoint_min: i32 => "StrommessungSollwertDruckMin",
        duration: i32 => "StrommessungMessdauer",
        repetitions: i32 => "StrommessungWiederholungen",
        min_current: i32 => "StrommessungMinStromfluss",
    }
}

group_shape! {
    pub struct FlowTestConfig in "Konfiguration_Detailtest/Durchfluss" {
        active: bool => "DurchflussmessungAktiv",
        pressure_setpoint: i32 => "DurchflussmessungSollwertDruck",
        duration: i32 => "DurchflussmessungMessdauer",
        repetitions: i32 => "DurchflussmessungWiederholungen",
        min_flow: i32 => "DurchflussmessungMinDurchfluss",
    }
}

group_shape! {
    pub struct ForceTestConfig in "Konfiguration_Detailtest/Kraft" {
        active: bool => "KraftmessungAktiv",
        pressure_setpoint: i32 => "KraftmessungSollwertDruck",
        duration: i32 => "KraftmessungMessdauer",
        repetitions: i32 => "KraftmessungWiederholungen",
        min_force: i32 => "KraftmessungMinKraft",
    }
}
