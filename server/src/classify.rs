//! Event normalization and classification.
//!
//! Maps the raw decoded payload (a loosely-typed JSON tree using
//! vendor-specific, inconsistently-cased key names) into a
//! [`CanonicalEvent`]. The device firmware mixes two naming conventions —
//! camelCase and all-lowercase — and a person identifier may arrive as
//! either `employeeNo` or `employeeNoString`, so every field owns a fixed
//! alias list and the first alias present wins.
//!
//! Validation fails closed: a mistyped required field is an error, never a
//! silent default, and the returned [`ValidationError`] enumerates every
//! offending field in one pass. Unrecognized fields anywhere in the payload
//! are ignored so that unknown firmware additions do not break ingestion.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationError};
use crate::types::{
    AccessDetail, AccessEvent, CanonicalEvent, Heartbeat, Purpose, HEARTBEAT_EVENT_TYPE,
};

// Alias tables. First present wins; order is part of the contract.
const DATE_TIME: &[&str] = &["dateTime", "datetime"];
const DEVICE_ID: &[&str] = &["deviceID", "deviceId", "deviceid"];
const EVENT_TYPE: &[&str] = &["eventType", "eventtype"];
const EVENT_STATE: &[&str] = &["eventState", "eventstate"];
const EVENT_DESCRIPTION: &[&str] = &["eventDescription", "eventdescription"];
const ACTIVE_POST_COUNT: &[&str] = &["activePostCount", "activepostcount"];
const ACCESS_DETAIL: &[&str] = &["AccessControllerEvent", "accessControllerEvent"];
const MAJOR_EVENT_TYPE: &[&str] = &["majorEventType", "majoreventtype"];
const SUB_EVENT_TYPE: &[&str] = &["subEventType", "subeventtype"];
const SERIAL_NO: &[&str] = &["serialNo", "serialno"];
const VERIFY_NO: &[&str] = &["verifyNo", "verifyno"];
const EMPLOYEE_NO: &[&str] = &["employeeNo", "employeeNoString", "employeeno"];
const PERSON_NAME: &[&str] = &["name", "personName"];
const ZONE_TYPE: &[&str] = &["zoneType", "type"];
const CARD_NO: &[&str] = &["cardNo", "cardno"];
const CARD_TYPE: &[&str] = &["cardType", "cardtype"];
const SWIPE_CARD_TYPE: &[&str] = &["swipeCardType", "swipecardtype"];
const USER_TYPE: &[&str] = &["userType", "usertype"];
const CURRENT_VERIFY_MODE: &[&str] = &["currentVerifyMode", "currentverifymode"];
const ATTENDANCE_STATUS: &[&str] = &["attendanceStatus", "attendancestatus"];
const PICTURES_NUMBER: &[&str] = &["picturesNumber", "picturesnumber"];
const MASK: &[&str] = &["mask"];

/// Classifies a raw payload into a [`CanonicalEvent`].
///
/// Selection is by explicit tag: an `eventType` of `heartBeat`
/// (case-insensitive) selects the heartbeat variant, anything else is
/// treated as an access event. Deterministic for a given input.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every missing or mistyped field.
pub fn classify(payload: &Value) -> Result<CanonicalEvent, ValidationError> {
    let Some(map) = payload.as_object() else {
        return Err(ValidationError::new(vec![FieldError::new(
            "$",
            "payload must be a JSON object",
        )]));
    };

    let mut errors = Vec::new();
    let event_type = required_string(map, EVENT_TYPE, &mut errors);

    let is_heartbeat = event_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case(HEARTBEAT_EVENT_TYPE));

    if is_heartbeat {
        classify_heartbeat(map, event_type, errors)
    } else {
        classify_access(map, event_type, errors)
    }
}

fn classify_heartbeat(
    map: &Map<String, Value>,
    event_type: Option<String>,
    mut errors: Vec<FieldError>,
) -> Result<CanonicalEvent, ValidationError> {
    let date_time = required_timestamp(map, DATE_TIME, &mut errors);
    let device_id = required_string(map, DEVICE_ID, &mut errors);
    let event_state = optional_string(map, EVENT_STATE, &mut errors);
    let event_description = optional_string(map, EVENT_DESCRIPTION, &mut errors);
    let active_post_count = optional_integer(map, ACTIVE_POST_COUNT, &mut errors);

    if !errors.is_empty() {
        return Err(ValidationError::new(errors));
    }

    // All required fields validated above; the unwraps cannot fire.
    Ok(CanonicalEvent::Heartbeat(Heartbeat {
        date_time: date_time.ok_or_else(invariant_violation)?,
        device_id: device_id.ok_or_else(invariant_violation)?,
        event_type: event_type.ok_or_else(invariant_violation)?,
        event_state,
        event_description,
        active_post_count,
    }))
}

fn classify_access(
    map: &Map<String, Value>,
    event_type: Option<String>,
    mut errors: Vec<FieldError>,
) -> Result<CanonicalEvent, ValidationError> {
    let date_time = required_timestamp(map, DATE_TIME, &mut errors);
    let device_id = required_string(map, DEVICE_ID, &mut errors);
    let event_state = optional_string(map, EVENT_STATE, &mut errors);
    let event_description = optional_string(map, EVENT_DESCRIPTION, &mut errors);
    let active_post_count = optional_integer(map, ACTIVE_POST_COUNT, &mut errors);

    let detail = match resolve(map, ACCESS_DETAIL) {
        Some(Value::Object(detail_map)) => Some(normalize_detail(detail_map, &mut errors)),
        Some(_) => {
            errors.push(FieldError::new(ACCESS_DETAIL[0], "must be a JSON object"));
            None
        }
        None => {
            errors.push(FieldError::new(ACCESS_DETAIL[0], "missing required field"));
            None
        }
    };

    if !errors.is_empty() {
        return Err(ValidationError::new(errors));
    }

    Ok(CanonicalEvent::Access(AccessEvent {
        date_time: date_time.ok_or_else(invariant_violation)?,
        device_id: device_id.ok_or_else(invariant_violation)?,
        event_type: event_type.ok_or_else(invariant_violation)?,
        event_state,
        event_description,
        active_post_count,
        detail: detail.flatten().ok_or_else(invariant_violation)?,
    }))
}

fn normalize_detail(map: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<AccessDetail> {
    let prefix = ACCESS_DETAIL[0];
    let mut nested = Vec::new();

    let major_event_type = required_integer(map, MAJOR_EVENT_TYPE, &mut nested);
    let sub_event_type = required_integer(map, SUB_EVENT_TYPE, &mut nested);
    let serial_no = optional_integer(map, SERIAL_NO, &mut nested);
    let verify_no = optional_integer(map, VERIFY_NO, &mut nested);
    let employee_no = optional_string_or_number(map, EMPLOYEE_NO, &mut nested);
    let person_name = optional_string(map, PERSON_NAME, &mut nested)
        // An empty name counts as absent for purpose derivation and storage.
        .filter(|name| !name.is_empty());
    let zone_type = optional_integer(map, ZONE_TYPE, &mut nested);
    let card_no = optional_string_or_number(map, CARD_NO, &mut nested);
    let card_type = optional_integer(map, CARD_TYPE, &mut nested);
    let swipe_card_type = optional_integer(map, SWIPE_CARD_TYPE, &mut nested);
    let user_type = optional_string(map, USER_TYPE, &mut nested);
    let current_verify_mode = optional_string(map, CURRENT_VERIFY_MODE, &mut nested);
    let attendance_status = optional_string(map, ATTENDANCE_STATUS, &mut nested);
    let pictures_number = optional_integer(map, PICTURES_NUMBER, &mut nested);
    let mask = optional_mask_flag(map, MASK, &mut nested);

    if !nested.is_empty() {
        errors.extend(
            nested
                .into_iter()
                .map(|e| FieldError::new(format!("{prefix}.{}", e.field), e.reason)),
        );
        return None;
    }

    let purpose = Purpose::derive(person_name.as_deref());

    Some(AccessDetail {
        major_event_type: major_event_type?,
        sub_event_type: sub_event_type?,
        serial_no,
        verify_no,
        employee_no,
        person_name,
        purpose,
        zone_type,
        card_no,
        card_type,
        swipe_card_type,
        user_type,
        current_verify_mode,
        attendance_status,
        pictures_number,
        mask,
    })
}

/// Resolves the first present alias for a field.
fn resolve<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| map.get(*alias))
}

fn required_string(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match resolve(map, aliases) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be a string"));
            None
        }
        None => {
            errors.push(FieldError::new(aliases[0], "missing required field"));
            None
        }
    }
}

fn optional_string(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match resolve(map, aliases) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be a string"));
            None
        }
    }
}

/// Optional string that tolerates a JSON integer (the vendor sends badge and
/// card numbers in both encodings).
fn optional_string_or_number(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match resolve(map, aliases) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be a string or number"));
            None
        }
    }
}

fn required_integer(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    match resolve(map, aliases) {
        Some(Value::Number(n)) if n.is_i64() => n.as_i64(),
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be an integer"));
            None
        }
        None => {
            errors.push(FieldError::new(aliases[0], "missing required field"));
            None
        }
    }
}

fn optional_integer(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    match resolve(map, aliases) {
        Some(Value::Number(n)) if n.is_i64() => n.as_i64(),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be an integer"));
            None
        }
    }
}

/// Mask detection arrives as a JSON bool or the vendor strings `yes`/`no`.
fn optional_mask_flag(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<bool> {
    match resolve(map, aliases) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("yes") => Some(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("no") => Some(false),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be a boolean or yes/no"));
            None
        }
    }
}

fn required_timestamp(
    map: &Map<String, Value>,
    aliases: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    match resolve(map, aliases) {
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                errors.push(FieldError::new(
                    aliases[0],
                    "must be an ISO-8601 timestamp with timezone",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(aliases[0], "must be a string"));
            None
        }
        None => {
            errors.push(FieldError::new(aliases[0], "missing required field"));
            None
        }
    }
}

// Only reachable if the error-accumulation bookkeeping above is broken.
fn invariant_violation() -> ValidationError {
    ValidationError::new(vec![FieldError::new(
        "$",
        "internal: field validated but absent",
    )])
}
