use chrono::{DateTime, Utc};
use rhm_schemas::{Actor, Appointment, AppointmentStatus, House, NewAppointment, NewNotice, Role, Subject};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

const MAX_NOTE_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppointmentEvent {
    Approve,
    Reject { reason: Option<String> },
    Complete,
    Cancel,
}

impl AppointmentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppointmentEvent::Approve => "approve",
            AppointmentEvent::Reject { .. } => "reject",
            AppointmentEvent::Complete => "complete",
            AppointmentEvent::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentPlan {
    pub appointment: Appointment,
    pub from: AppointmentStatus,
    pub notices: Vec<NewNotice>,
}

/// A viewing may be requested by a tenant, for a future time, on a rentable
/// house they do not own.
pub fn validate_appointment_request(
    house: &House,
    actor: &Actor,
    req: &NewAppointment,
    now: DateTime<Utc>,
) -> Result<(), MarketError> {
    if actor.role != Role::Tenant {
        return Err(MarketError::forbidden(actor, "only tenants can request viewings"));
    }
    if actor.user_id == house.owner_id {
        return Err(MarketError::validation("cannot request a viewing of your own house"));
    }
    if !house.status.is_rentable() {
        return Err(MarketError::conflict(format!(
            "house {} is not open for viewings (status {})",
            house.id, house.status
        )));
    }
    if req.appointment_time <= now {
        return Err(MarketError::validation("appointment_time must be in the future"));
    }
    if let Some(note) = &req.note {
        if note.chars().count() > MAX_NOTE_LEN {
            return Err(MarketError::validation(format!(
                "note exceeds {MAX_NOTE_LEN} characters"
            )));
        }
    }
    Ok(())
}

pub fn plan_appointment(
    appt: &Appointment,
    actor: &Actor,
    event: &AppointmentEvent,
    now: DateTime<Utc>,
) -> Result<AppointmentPlan, MarketError> {
    let is_tenant = actor.role == Role::Tenant && actor.user_id == appt.user_id;
    let is_landlord = actor.role == Role::Landlord && actor.user_id == appt.landlord_id;
    let allowed = match event {
        AppointmentEvent::Cancel => is_tenant || actor.is_privileged(),
        _ => is_landlord || actor.is_privileged(),
    };
    if !allowed {
        return Err(MarketError::forbidden(
            actor,
            format!("may not {} appointment {}", event.name(), appt.id),
        ));
    }

    use AppointmentStatus::*;

    let from = appt.status;
    let mut next = appt.clone();
    let recipient = match event {
        AppointmentEvent::Cancel => appt.landlord_id,
        _ => appt.user_id,
    };

    match (from, event) {
        (Pending, AppointmentEvent::Approve) => next.status = Approved,
        (Pending, AppointmentEvent::Reject { reason }) => {
            next.status = Rejected;
            next.reject_reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string);
        }
        (Approved, AppointmentEvent::Complete) => next.status = Completed,
        (Pending | Approved, AppointmentEvent::Cancel) => next.status = Canceled,
        (state, ev) => {
            return Err(MarketError::invalid_state("appointment", appt.id, state, ev.name()));
        }
    }

    next.updated_at = now;
    let notices = vec![NewNotice {
        recipient_id: recipient,
        kind: format!("appointment.{}", next.status.as_str().to_ascii_lowercase()),
        subject: Subject::Appointment,
        subject_id: appt.id,
        message: format!("Viewing {} of house {} is now {}", appt.id, appt.house_id, next.status),
    }];

    Ok(AppointmentPlan {
        appointment: next,
        from,
        notices,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rhm_schemas::HouseStatus;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn appt(status: AppointmentStatus) -> Appointment {
        Appointment {
            id: 11,
            house_id: 5,
            user_id: 7,
            landlord_id: 3,
            appointment_time: now() + Duration::days(2),
            note: None,
            status,
            reject_reason: None,
            version: 1,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn landlord_approves_then_completes() {
        let landlord = Actor::landlord(3);
        let p = plan_appointment(&appt(AppointmentStatus::Pending), &landlord, &AppointmentEvent::Approve, now())
            .unwrap();
        assert_eq!(p.appointment.status, AppointmentStatus::Approved);
        assert_eq!(p.notices[0].recipient_id, 7);
        assert_eq!(p.notices[0].kind, "appointment.approved");

        let p = plan_appointment(&p.appointment, &landlord, &AppointmentEvent::Complete, now()).unwrap();
        assert_eq!(p.appointment.status, AppointmentStatus::Completed);
    }

    #[test]
    fn terminal_appointments_refuse_events() {
        let err = plan_appointment(
            &appt(AppointmentStatus::Completed),
            &Actor::tenant(7),
            &AppointmentEvent::Cancel,
            now(),
        )
        .unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn tenant_cannot_approve() {
        let err = plan_appointment(
            &appt(AppointmentStatus::Pending),
            &Actor::tenant(7),
            &AppointmentEvent::Approve,
            now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn request_must_be_in_the_future_on_a_rentable_house() {
        let house = House {
            id: 5,
            owner_id: 3,
            title: "Loft".to_string(),
            city: "Porto".to_string(),
            district: String::new(),
            address: "Rua 2".to_string(),
            price_cents: 80_000,
            area_sqm: 40,
            status: HouseStatus::Online,
            reject_reason: None,
            version: 1,
            created_at: now(),
            updated_at: now(),
        };
        let mut req = NewAppointment {
            house_id: 5,
            appointment_time: now() + Duration::hours(3),
            note: Some("after work".to_string()),
        };
        assert!(validate_appointment_request(&house, &Actor::tenant(7), &req, now()).is_ok());

        req.appointment_time = now() - Duration::hours(1);
        assert_eq!(
            validate_appointment_request(&house, &Actor::tenant(7), &req, now())
                .unwrap_err()
                .kind(),
            "validation"
        );

        let rented = House {
            status: HouseStatus::Rented,
            ..house
        };
        req.appointment_time = now() + Duration::hours(3);
        assert_eq!(
            validate_appointment_request(&rented, &Actor::tenant(7), &req, now())
                .unwrap_err()
                .kind(),
            "conflict"
        );
    }
}
