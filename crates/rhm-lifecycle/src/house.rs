//! Listing moderation.
//!
//! RENTED is never produced here: only the lease planner writes it, and a
//! RENTED house refuses every moderation action until its lease ends.

use chrono::{DateTime, Utc};
use rhm_schemas::{Actor, House, HousePatch, HouseStatus, NewHouse, NewNotice, Role, Subject};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::lease::required_text;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HouseAction {
    Approve,
    Reject { reason: String },
    Online,
    Offline,
    Delete,
    Edit(HousePatch),
}

impl HouseAction {
    pub fn name(&self) -> &'static str {
        match self {
            HouseAction::Approve => "approve",
            HouseAction::Reject { .. } => "reject",
            HouseAction::Online => "online",
            HouseAction::Offline => "offline",
            HouseAction::Delete => "delete",
            HouseAction::Edit(_) => "edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HousePlan {
    pub house: House,
    pub from: HouseStatus,
    pub notices: Vec<NewNotice>,
}

/// Check a new listing before insert. The listing starts PENDING.
pub fn validate_new_house(actor: &Actor, new: &NewHouse) -> Result<(), MarketError> {
    if actor.role != Role::Landlord {
        return Err(MarketError::forbidden(actor, "only landlords can list houses"));
    }
    check_title(&new.title)?;
    if new.city.trim().is_empty() {
        return Err(MarketError::validation("city is required"));
    }
    if new.address.trim().is_empty() {
        return Err(MarketError::validation("address is required"));
    }
    check_price(new.price_cents)?;
    check_area(new.area_sqm)?;
    Ok(())
}

fn check_title(title: &str) -> Result<(), MarketError> {
    let t = title.trim();
    if t.is_empty() {
        return Err(MarketError::validation("title is required"));
    }
    if t.chars().count() > MAX_TITLE_LEN {
        return Err(MarketError::validation(format!(
            "title exceeds {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn check_price(price_cents: i64) -> Result<(), MarketError> {
    if price_cents <= 0 {
        return Err(MarketError::validation("price_cents must be > 0"));
    }
    Ok(())
}

fn check_area(area_sqm: i32) -> Result<(), MarketError> {
    if area_sqm < 0 {
        return Err(MarketError::validation("area_sqm must be >= 0"));
    }
    Ok(())
}

pub fn plan_house(
    house: &House,
    actor: &Actor,
    action: &HouseAction,
    now: DateTime<Utc>,
) -> Result<HousePlan, MarketError> {
    let is_owner = actor.role == Role::Landlord && actor.user_id == house.owner_id;
    let allowed = match action {
        HouseAction::Approve | HouseAction::Reject { .. } => actor.is_privileged(),
        _ => is_owner || actor.is_privileged(),
    };
    if !allowed {
        return Err(MarketError::forbidden(
            actor,
            format!("may not {} house {}", action.name(), house.id),
        ));
    }

    use HouseStatus::*;

    let from = house.status;
    let mut next = house.clone();
    let mut notices = Vec::new();

    match (from, action) {
        (Pending, HouseAction::Approve) => {
            next.status = Approved;
            next.reject_reason = None;
            notices.push(notice(
                house,
                "house.approved",
                format!("Listing {} was approved", house.id),
            ));
        }
        (Pending, HouseAction::Reject { reason }) => {
            next.status = Rejected;
            next.reject_reason = Some(required_text("reason", reason)?);
            notices.push(notice(
                house,
                "house.rejected",
                format!("Listing {} was rejected", house.id),
            ));
        }
        (Approved | Offline, HouseAction::Online) => next.status = Online,
        (Approved | Online, HouseAction::Offline) => next.status = Offline,
        (Pending | Approved | Online | Offline | Rejected, HouseAction::Edit(patch)) => {
            if patch.is_empty() {
                return Err(MarketError::validation("nothing to update"));
            }
            apply_patch(&mut next, patch)?;
            if from == Rejected {
                next.status = Pending;
                next.reject_reason = None;
            }
        }
        (Pending | Approved | Online | Offline | Rejected, HouseAction::Delete) => {
            next.status = Deleted;
        }
        (state, a) => {
            return Err(MarketError::invalid_state("house", house.id, state, a.name()));
        }
    }

    if !actor.is_privileged() {
        // Owners acting on their own listing need no notice.
        notices.clear();
    }
    next.updated_at = now;
    Ok(HousePlan {
        house: next,
        from,
        notices,
    })
}

fn apply_patch(house: &mut House, patch: &HousePatch) -> Result<(), MarketError> {
    if let Some(title) = &patch.title {
        check_title(title)?;
        house.title = title.trim().to_string();
    }
    if let Some(city) = &patch.city {
        if city.trim().is_empty() {
            return Err(MarketError::validation("city is required"));
        }
        house.city = city.trim().to_string();
    }
    if let Some(district) = &patch.district {
        house.district = district.trim().to_string();
    }
    if let Some(address) = &patch.address {
        if address.trim().is_empty() {
            return Err(MarketError::validation("address is required"));
        }
        house.address = address.trim().to_string();
    }
    if let Some(price) = patch.price_cents {
        check_price(price)?;
        house.price_cents = price;
    }
    if let Some(area) = patch.area_sqm {
        check_area(area)?;
        house.area_sqm = area;
    }
    Ok(())
}

fn notice(house: &House, kind: &str, message: String) -> NewNotice {
    NewNotice {
        recipient_id: house.owner_id,
        kind: kind.to_string(),
        subject: Subject::House,
        subject_id: house.id,
        message,
    }
}
