//! Commission records, qualifying events, and the commission state machine.

use super::{Decimal, MemberId, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned commission identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionId(pub i64);

impl fmt::Display for CommissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of event that generates volume and commissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Purchase,
    Subscription,
    Renewal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Purchase => "purchase",
            EventType::Subscription => "subscription",
            EventType::Renewal => "renewal",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(EventType::Purchase),
            "subscription" => Ok(EventType::Subscription),
            "renewal" => Ok(EventType::Renewal),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// Commission lifecycle: `pending -> paid` or `pending -> cancelled`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommissionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: CommissionStatus) -> bool {
        *self == CommissionStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "paid" => Ok(CommissionStatus::Paid),
            "cancelled" => Ok(CommissionStatus::Cancelled),
            other => Err(format!("unknown commission status: {}", other)),
        }
    }
}

/// A volume-bearing event raised by a member (e.g. a completed purchase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifyingEvent {
    pub member_id: MemberId,
    pub amount: Decimal,
    pub event_type: EventType,
    pub occurred_at: TimeMs,
}

/// Commission computed by the engine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommission {
    pub earner_id: MemberId,
    pub source_id: MemberId,
    pub level: u32,
    pub amount: Decimal,
    pub commission_type: EventType,
    pub earned_at: TimeMs,
}

impl NewCommission {
    pub fn into_commission(self, id: CommissionId) -> Commission {
        Commission {
            id,
            earner_id: self.earner_id,
            source_id: self.source_id,
            level: self.level,
            amount: self.amount,
            commission_type: self.commission_type,
            status: CommissionStatus::Pending,
            earned_at: self.earned_at,
            paid_at: None,
        }
    }
}

/// A persisted commission. The amount never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: CommissionId,
    pub earner_id: MemberId,
    pub source_id: MemberId,
    pub level: u32,
    pub amount: Decimal,
    pub commission_type: EventType,
    pub status: CommissionStatus,
    pub earned_at: TimeMs,
    pub paid_at: Option<TimeMs>,
}

impl Commission {
    /// Apply a status transition, stamping `paid_at` when paid.
    ///
    /// Returns the current status unchanged as the error when the move is not allowed.
    pub fn transition(
        &mut self,
        next: CommissionStatus,
        at: TimeMs,
    ) -> Result<(), CommissionStatus> {
        if !self.status.can_transition_to(next) {
            return Err(self.status);
        }
        self.status = next;
        if next == CommissionStatus::Paid {
            self.paid_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Commission {
        NewCommission {
            earner_id: MemberId::new("a"),
            source_id: MemberId::new("x"),
            level: 1,
            amount: Decimal::from(100i64),
            commission_type: EventType::Purchase,
            earned_at: TimeMs::new(1),
        }
        .into_commission(CommissionId(7))
    }

    #[test]
    fn test_pending_can_be_paid_once() {
        let mut c = pending();
        assert!(c.transition(CommissionStatus::Paid, TimeMs::new(9)).is_ok());
        assert_eq!(c.paid_at, Some(TimeMs::new(9)));
        assert_eq!(
            c.transition(CommissionStatus::Paid, TimeMs::new(10)),
            Err(CommissionStatus::Paid)
        );
        assert_eq!(c.paid_at, Some(TimeMs::new(9)));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut c = pending();
        c.transition(CommissionStatus::Cancelled, TimeMs::new(2)).unwrap();
        assert!(c.status.is_terminal());
        assert!(c.paid_at.is_none());
        assert_eq!(
            c.transition(CommissionStatus::Paid, TimeMs::new(3)),
            Err(CommissionStatus::Cancelled)
        );
    }

    #[test]
    fn test_no_transition_back_to_pending() {
        assert!(!CommissionStatus::Pending.can_transition_to(CommissionStatus::Pending));
        assert!(!CommissionStatus::Paid.can_transition_to(CommissionStatus::Pending));
    }

    #[test]
    fn test_event_type_serde_lowercase() {
        let json = serde_json::to_string(&EventType::Subscription).unwrap();
        assert_eq!(json, "\"subscription\"");
        assert_eq!("renewal".parse::<EventType>().unwrap(), EventType::Renewal);
    }
}
