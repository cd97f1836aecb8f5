//! The access directory — decides whether a resolved account may pass a gate.
//!
//! Side-effect free, operating on a grant snapshot the caller read moments
//! earlier. That snapshot can go stale before the transition commits, so the
//! store re-verifies grant membership inside the `apply_tap` transaction;
//! this module is the fast pre-check and the source of the reader-facing
//! access list.

use portier_core::{
  gate::{Gate, Location},
  grant::GateGrant,
  tap::DenyReason,
};

/// Check a resolved account's grant set against a gate.
///
/// Fails with [`DenyReason::GateInactive`] when the gate or its location is
/// disabled, and [`DenyReason::NotAuthorized`] when no active grant covers
/// the gate.
pub fn authorize(
  gate:     &Gate,
  location: &Location,
  granted:  &[GateGrant],
) -> Result<(), DenyReason> {
  if !gate.active || !location.active {
    return Err(DenyReason::GateInactive);
  }
  if !granted.iter().any(|g| g.gate_id == gate.gate_id) {
    return Err(DenyReason::NotAuthorized);
  }
  Ok(())
}

/// The hardware ids a reader terminal displays as the account's access list.
pub fn access_list(granted: &[GateGrant]) -> Vec<i64> {
  granted.iter().map(|g| g.hardware_id).collect()
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use portier_core::gate::GateKind;
  use uuid::Uuid;

  use super::*;

  fn location(active: bool) -> Location {
    Location {
      location_id: Uuid::new_v4(),
      name:        "HQ".into(),
      active,
      created_at:  Utc::now(),
    }
  }

  fn gate(location: &Location, active: bool) -> Gate {
    Gate {
      gate_id:     Uuid::new_v4(),
      name:        "Gate A".into(),
      hardware_id: 1,
      location_id: location.location_id,
      kind:        GateKind::Physical,
      active,
      created_at:  Utc::now(),
    }
  }

  #[test]
  fn granted_gate_passes() {
    let loc = location(true);
    let g = gate(&loc, true);
    let grants = [GateGrant { gate_id: g.gate_id, hardware_id: 1 }];
    assert!(authorize(&g, &loc, &grants).is_ok());
  }

  #[test]
  fn ungranted_gate_is_not_authorized() {
    let loc = location(true);
    let g = gate(&loc, true);
    let grants = [GateGrant { gate_id: Uuid::new_v4(), hardware_id: 2 }];
    assert_eq!(authorize(&g, &loc, &grants), Err(DenyReason::NotAuthorized));
  }

  #[test]
  fn inactive_gate_wins_over_grant() {
    let loc = location(true);
    let g = gate(&loc, false);
    let grants = [GateGrant { gate_id: g.gate_id, hardware_id: 1 }];
    assert_eq!(authorize(&g, &loc, &grants), Err(DenyReason::GateInactive));
  }

  #[test]
  fn inactive_location_disables_gate() {
    let loc = location(false);
    let g = gate(&loc, true);
    let grants = [GateGrant { gate_id: g.gate_id, hardware_id: 1 }];
    assert_eq!(authorize(&g, &loc, &grants), Err(DenyReason::GateInactive));
  }
}
