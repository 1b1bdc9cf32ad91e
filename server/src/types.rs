//! Canonical event types for the GateHub server.
//!
//! This module defines the normalized representation of one webhook
//! notification from an access-control device. Events are immutable once
//! created: the normalizer produces them, the persistence gateway and the
//! broadcast hub consume them, and nothing mutates them in between.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event-type tag the devices use for liveness pings.
pub const HEARTBEAT_EVENT_TYPE: &str = "heartBeat";

/// Derived business classification for an access event.
///
/// Never accepted from input: `Attendance` when the notification carries a
/// non-empty person name, `Information` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Purpose {
    Attendance,
    Information,
}

impl Purpose {
    /// Derives the purpose from an optional person name.
    ///
    /// An empty string counts as absent.
    #[must_use]
    pub fn derive(person_name: Option<&str>) -> Self {
        match person_name {
            Some(name) if !name.is_empty() => Self::Attendance,
            _ => Self::Information,
        }
    }

    /// The storage representation of this purpose.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attendance => "ATTENDANCE",
            Self::Information => "INFORMATION",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A liveness ping from a device. Never correlates with an attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    /// Device-local timestamp of the ping.
    pub date_time: DateTime<Utc>,

    /// Identifier of the sending device.
    pub device_id: String,

    /// Event-type tag as sent by the device (`heartBeat`).
    pub event_type: String,

    /// Event state reported by the device, if any.
    pub event_state: Option<String>,

    /// Free-text description, if any.
    pub event_description: Option<String>,

    /// Number of active notification posts the device reports.
    pub active_post_count: Option<i64>,
}

/// An access-control notification (door open, card swipe, face match, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessEvent {
    /// Device-local timestamp of the event. Always timezone-aware.
    pub date_time: DateTime<Utc>,

    /// Identifier of the sending device.
    pub device_id: String,

    /// Event-type tag as sent by the device.
    pub event_type: String,

    /// Event state reported by the device, if any.
    pub event_state: Option<String>,

    /// Free-text description, if any.
    pub event_description: Option<String>,

    /// Number of active notification posts the device reports.
    pub active_post_count: Option<i64>,

    /// Vendor access-controller detail block.
    pub detail: AccessDetail,
}

/// The access-controller detail block nested inside an [`AccessEvent`].
///
/// Field names follow the vendor's access-controller schema; only the
/// major/minor event codes are mandatory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDetail {
    /// Major event code. Required.
    pub major_event_type: i64,

    /// Minor (sub) event code. Required.
    pub sub_event_type: i64,

    /// Device-assigned serial number of the notification.
    pub serial_no: Option<i64>,

    /// Verification record number.
    pub verify_no: Option<i64>,

    /// Person identifier (badge/employee number).
    pub employee_no: Option<String>,

    /// Person name, when the device resolved one.
    pub person_name: Option<String>,

    /// Derived classification, computed from `person_name`.
    pub purpose: Purpose,

    /// Zone type code.
    pub zone_type: Option<i64>,

    /// Card number that was swiped, if any.
    pub card_no: Option<String>,

    /// Card type code.
    pub card_type: Option<i64>,

    /// Swipe type code.
    pub swipe_card_type: Option<i64>,

    /// User type (`normal`, `visitor`, ...).
    pub user_type: Option<String>,

    /// Verification mode in effect (`cardOrFace`, `face`, ...).
    pub current_verify_mode: Option<String>,

    /// Attendance status (`checkIn`, `checkOut`, ...).
    pub attendance_status: Option<String>,

    /// Number of pictures the device captured for this event.
    pub pictures_number: Option<i64>,

    /// Whether the person wore a mask, when the device detects it.
    pub mask: Option<bool>,
}

/// Normalized, validated representation of one webhook notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CanonicalEvent {
    Heartbeat(Heartbeat),
    Access(AccessEvent),
}

impl CanonicalEvent {
    /// The identifier of the device that produced this event.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Heartbeat(hb) => &hb.device_id,
            Self::Access(ev) => &ev.device_id,
        }
    }

    /// The device-local timestamp of this event.
    #[must_use]
    pub fn date_time(&self) -> DateTime<Utc> {
        match self {
            Self::Heartbeat(hb) => hb.date_time,
            Self::Access(ev) => ev.date_time,
        }
    }

    /// The event-type tag as sent by the device.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Heartbeat(hb) => &hb.event_type,
            Self::Access(ev) => &ev.event_type,
        }
    }

    /// Renders the one-line summary pushed to observers.
    ///
    /// Absent optional fields render as `N/A` or are omitted entirely, so
    /// the line stays grep-friendly:
    ///
    /// ```text
    /// [2025-01-01T10:00:00+00:00] DevID=dev1 Type=AccessControllerEvent Major=5 Sub=75 Mode=N/A EmpNo=E1 Name='Jane Doe'
    /// ```
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Heartbeat(hb) => {
                let mut parts = vec![
                    format!("[{}]", hb.date_time.to_rfc3339()),
                    format!("DevID={}", hb.device_id),
                    format!("Type={}", hb.event_type),
                ];
                if let Some(state) = &hb.event_state {
                    parts.push(format!("State={state}"));
                }
                if let Some(desc) = &hb.event_description {
                    parts.push(format!("Desc='{desc}'"));
                }
                parts.join(" ")
            }
            Self::Access(ev) => {
                let detail = &ev.detail;
                let mut parts = vec![
                    format!("[{}]", ev.date_time.to_rfc3339()),
                    format!("DevID={}", ev.device_id),
                    format!("Type={}", ev.event_type),
                    format!("Major={}", detail.major_event_type),
                    format!("Sub={}", detail.sub_event_type),
                    format!(
                        "Mode={}",
                        detail.current_verify_mode.as_deref().unwrap_or("N/A")
                    ),
                ];
                if let Some(employee_no) = &detail.employee_no {
                    parts.push(format!("EmpNo={employee_no}"));
                }
                if let Some(name) = &detail.person_name {
                    parts.push(format!("Name='{name}'"));
                }
                if let Some(card_no) = &detail.card_no {
                    parts.push(format!("CardNo={card_no}"));
                }
                parts.push(format!("Purpose={}", detail.purpose));
                parts.join(" ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_detail() -> AccessDetail {
        AccessDetail {
            major_event_type: 5,
            sub_event_type: 75,
            serial_no: Some(118),
            verify_no: None,
            employee_no: Some("E1".to_string()),
            person_name: Some("Jane Doe".to_string()),
            purpose: Purpose::Attendance,
            zone_type: None,
            card_no: None,
            card_type: None,
            swipe_card_type: None,
            user_type: Some("normal".to_string()),
            current_verify_mode: None,
            attendance_status: Some("checkIn".to_string()),
            pictures_number: Some(1),
            mask: Some(false),
        }
    }

    fn sample_access_event() -> AccessEvent {
        AccessEvent {
            date_time: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            device_id: "dev1".to_string(),
            event_type: "AccessControllerEvent".to_string(),
            event_state: Some("active".to_string()),
            event_description: Some("Access Controller Event".to_string()),
            active_post_count: Some(1),
            detail: sample_detail(),
        }
    }

    #[test]
    fn purpose_derive_with_name_is_attendance() {
        assert_eq!(Purpose::derive(Some("Jane Doe")), Purpose::Attendance);
    }

    #[test]
    fn purpose_derive_without_name_is_information() {
        assert_eq!(Purpose::derive(None), Purpose::Information);
    }

    #[test]
    fn purpose_derive_empty_name_counts_as_absent() {
        assert_eq!(Purpose::derive(Some("")), Purpose::Information);
    }

    #[test]
    fn purpose_as_str_matches_storage_representation() {
        assert_eq!(Purpose::Attendance.as_str(), "ATTENDANCE");
        assert_eq!(Purpose::Information.as_str(), "INFORMATION");
    }

    #[test]
    fn access_summary_contains_device_and_name() {
        let event = CanonicalEvent::Access(sample_access_event());
        let summary = event.summary();

        assert!(summary.contains("DevID=dev1"));
        assert!(summary.contains("Name='Jane Doe'"));
        assert!(summary.contains("Major=5"));
        assert!(summary.contains("Sub=75"));
        assert!(summary.contains("EmpNo=E1"));
        assert!(summary.contains("Purpose=ATTENDANCE"));
    }

    #[test]
    fn access_summary_renders_missing_mode_as_na() {
        let event = CanonicalEvent::Access(sample_access_event());
        assert!(event.summary().contains("Mode=N/A"));
    }

    #[test]
    fn access_summary_omits_absent_optionals() {
        let mut access = sample_access_event();
        access.detail.employee_no = None;
        access.detail.person_name = None;
        access.detail.purpose = Purpose::Information;
        let summary = CanonicalEvent::Access(access).summary();

        assert!(!summary.contains("EmpNo="));
        assert!(!summary.contains("Name="));
        assert!(summary.contains("Purpose=INFORMATION"));
    }

    #[test]
    fn heartbeat_summary_contains_tag_and_device() {
        let event = CanonicalEvent::Heartbeat(Heartbeat {
            date_time: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            device_id: "dev7".to_string(),
            event_type: HEARTBEAT_EVENT_TYPE.to_string(),
            event_state: Some("active".to_string()),
            event_description: None,
            active_post_count: Some(0),
        });
        let summary = event.summary();

        assert!(summary.contains("DevID=dev7"));
        assert!(summary.contains("Type=heartBeat"));
        assert!(summary.contains("State=active"));
        assert!(!summary.contains("Desc="));
    }

    #[test]
    fn accessors_cover_both_variants() {
        let access = CanonicalEvent::Access(sample_access_event());
        assert_eq!(access.device_id(), "dev1");
        assert_eq!(access.event_type(), "AccessControllerEvent");

        let heartbeat = CanonicalEvent::Heartbeat(Heartbeat {
            date_time: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            device_id: "dev7".to_string(),
            event_type: HEARTBEAT_EVENT_TYPE.to_string(),
            event_state: None,
            event_description: None,
            active_post_count: None,
        });
        assert_eq!(heartbeat.device_id(), "dev7");
        assert_eq!(heartbeat.event_type(), "heartBeat");
    }
}
