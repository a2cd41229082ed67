//! The order status machine.
//!
//! Every legal status change is listed in [`OrderStatus::apply`]. Anything not listed there is rejected with
//! [`TransitionError::Forbidden`], so an order can never move backwards (e.g. from `ProjectComplete` back to `New`).
//! The only way to "restart" a finished order is re-creation, which produces a brand-new order.
//!
//! The public status is a pure lookup on the private one, see [`OrderStatus::public_status`].
use std::{fmt::Display, str::FromStr};

use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been validated and stored. No payment has been attempted yet.
    New,
    /// The payment provider accepted the payment request and the payer is completing it.
    PaymentSystemCreate,
    /// The provider refused to create the payment.
    PaymentSystemRejectOnCreate,
    /// The provider rejected the payment after it was created.
    PaymentSystemReject,
    /// The provider confirmed the payment. The merchant has not confirmed fulfilment yet.
    PaymentSystemComplete,
    PaymentSystemDeclined,
    PaymentSystemCanceled,
    ProjectComplete,
    ProjectReject,
    Refund,
    Chargeback,
    ItemReplaced,
}

/// Something that happened to an order and may change its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEvent {
    PaymentCreated,
    PaymentCreateRejected,
    PaymentCompleted,
    PaymentDeclined,
    PaymentCanceled,
    PaymentRejected,
    ProjectAccepted,
    ProjectRejected,
    Refunded,
    ChargedBack,
    ItemReplaced,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("An order in status {from} cannot accept the {event:?} event")]
    Forbidden { from: OrderStatus, event: OrderEvent },
}

/// The coarse status shown to payers and merchants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicStatus {
    Created,
    Processed,
    Rejected,
    Declined,
    Canceled,
    Refunded,
    Chargeback,
}

impl OrderStatus {
    /// Returns the status an order moves to when `event` happens, or an error if the transition is not allowed.
    pub fn apply(self, event: OrderEvent) -> Result<OrderStatus, TransitionError> {
        use OrderEvent as E;
        use OrderStatus::*;
        let next = match (self, event) {
            (New, E::PaymentCreated) => PaymentSystemCreate,
            // A payer may re-submit the payment form while the first attempt is still open
            (PaymentSystemCreate, E::PaymentCreated) => PaymentSystemCreate,
            (New | PaymentSystemCreate, E::PaymentCreateRejected) => PaymentSystemRejectOnCreate,
            (PaymentSystemCreate, E::PaymentCompleted) => PaymentSystemComplete,
            (PaymentSystemCreate, E::PaymentDeclined) => PaymentSystemDeclined,
            (PaymentSystemCreate, E::PaymentCanceled) => PaymentSystemCanceled,
            (PaymentSystemCreate, E::PaymentRejected) => PaymentSystemReject,
            (PaymentSystemComplete, E::ProjectAccepted) => ProjectComplete,
            (PaymentSystemComplete, E::ProjectRejected) => ProjectReject,
            (PaymentSystemComplete | ProjectComplete, E::Refunded) => Refund,
            (PaymentSystemComplete | ProjectComplete, E::ChargedBack) => Chargeback,
            (ProjectComplete, E::ItemReplaced) => ItemReplaced,
            (from, event) => return Err(TransitionError::Forbidden { from, event }),
        };
        Ok(next)
    }

    pub fn public_status(&self) -> PublicStatus {
        use OrderStatus::*;
        match self {
            New | PaymentSystemCreate => PublicStatus::Created,
            PaymentSystemComplete | ProjectComplete | ItemReplaced => PublicStatus::Processed,
            PaymentSystemRejectOnCreate | PaymentSystemReject | ProjectReject => PublicStatus::Rejected,
            PaymentSystemDeclined => PublicStatus::Declined,
            PaymentSystemCanceled => PublicStatus::Canceled,
            Refund => PublicStatus::Refunded,
            Chargeback => PublicStatus::Chargeback,
        }
    }

    /// The payment attempt for this order is over: no more payment forms may be submitted.
    pub fn is_ended(&self) -> bool {
        !matches!(self, OrderStatus::New | OrderStatus::PaymentSystemCreate)
    }

    /// The payment attempt ended without money changing hands.
    pub fn is_unsuccessful_end(&self) -> bool {
        use OrderStatus::*;
        matches!(
            self,
            PaymentSystemRejectOnCreate | PaymentSystemReject | PaymentSystemDeclined | PaymentSystemCanceled
        )
    }

    /// Money was taken at some point. Covers every status reachable from `PaymentSystemComplete`, including
    /// `ProjectReject` which leaves the settled payment to be refunded by the merchant.
    pub fn is_paid(&self) -> bool {
        use OrderStatus::*;
        matches!(self, PaymentSystemComplete | ProjectComplete | ProjectReject | Refund | Chargeback | ItemReplaced)
    }

    /// Orders in these statuses may be re-created. `New` and `PaymentSystemCreate` count as a retry.
    pub fn can_be_recreated(&self) -> bool {
        !self.is_ended() || self.is_unsuccessful_end()
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "New",
            OrderStatus::PaymentSystemCreate => "PaymentSystemCreate",
            OrderStatus::PaymentSystemRejectOnCreate => "PaymentSystemRejectOnCreate",
            OrderStatus::PaymentSystemReject => "PaymentSystemReject",
            OrderStatus::PaymentSystemComplete => "PaymentSystemComplete",
            OrderStatus::PaymentSystemDeclined => "PaymentSystemDeclined",
            OrderStatus::PaymentSystemCanceled => "PaymentSystemCanceled",
            OrderStatus::ProjectComplete => "ProjectComplete",
            OrderStatus::ProjectReject => "ProjectReject",
            OrderStatus::Refund => "Refund",
            OrderStatus::Chargeback => "Chargeback",
            OrderStatus::ItemReplaced => "ItemReplaced",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "PaymentSystemCreate" => Ok(Self::PaymentSystemCreate),
            "PaymentSystemRejectOnCreate" => Ok(Self::PaymentSystemRejectOnCreate),
            "PaymentSystemReject" => Ok(Self::PaymentSystemReject),
            "PaymentSystemComplete" => Ok(Self::PaymentSystemComplete),
            "PaymentSystemDeclined" => Ok(Self::PaymentSystemDeclined),
            "PaymentSystemCanceled" => Ok(Self::PaymentSystemCanceled),
            "ProjectComplete" => Ok(Self::ProjectComplete),
            "ProjectReject" => Ok(Self::ProjectReject),
            "Refund" => Ok(Self::Refund),
            "Chargeback" => Ok(Self::Chargeback),
            "ItemReplaced" => Ok(Self::ItemReplaced),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("🗃️ Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatus::New
        })
    }
}

impl Display for PublicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PublicStatus::Created => "created",
            PublicStatus::Processed => "processed",
            PublicStatus::Rejected => "rejected",
            PublicStatus::Declined => "declined",
            PublicStatus::Canceled => "canceled",
            PublicStatus::Refunded => "refunded",
            PublicStatus::Chargeback => "chargeback",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::{OrderEvent as E, OrderStatus::*, *};

    const ALL_STATUSES: [OrderStatus; 12] = [
        New,
        PaymentSystemCreate,
        PaymentSystemRejectOnCreate,
        PaymentSystemReject,
        PaymentSystemComplete,
        PaymentSystemDeclined,
        PaymentSystemCanceled,
        ProjectComplete,
        ProjectReject,
        Refund,
        Chargeback,
        ItemReplaced,
    ];

    const ALL_EVENTS: [OrderEvent; 11] = [
        E::PaymentCreated,
        E::PaymentCreateRejected,
        E::PaymentCompleted,
        E::PaymentDeclined,
        E::PaymentCanceled,
        E::PaymentRejected,
        E::ProjectAccepted,
        E::ProjectRejected,
        E::Refunded,
        E::ChargedBack,
        E::ItemReplaced,
    ];

    #[test]
    fn happy_path() {
        let s = New.apply(E::PaymentCreated).unwrap();
        assert_eq!(s, PaymentSystemCreate);
        let s = s.apply(E::PaymentCompleted).unwrap();
        assert_eq!(s, PaymentSystemComplete);
        let s = s.apply(E::ProjectAccepted).unwrap();
        assert_eq!(s, ProjectComplete);
        assert_eq!(s.apply(E::Refunded).unwrap(), Refund);
        assert_eq!(s.apply(E::ItemReplaced).unwrap(), ItemReplaced);
    }

    #[test]
    fn nothing_leads_back_to_new() {
        for status in ALL_STATUSES {
            for event in ALL_EVENTS {
                if let Ok(next) = status.apply(event) {
                    assert_ne!(next, New, "{status} --{event:?}--> New");
                }
            }
        }
    }

    #[test]
    fn refunds_need_a_completed_payment() {
        for status in [New, PaymentSystemCreate, PaymentSystemDeclined, PaymentSystemCanceled] {
            assert!(status.apply(E::Refunded).is_err());
            assert!(status.apply(E::ChargedBack).is_err());
        }
    }

    #[test]
    fn callbacks_are_only_accepted_in_create() {
        for status in ALL_STATUSES.into_iter().filter(|s| *s != PaymentSystemCreate) {
            let err = status.apply(E::PaymentCompleted).unwrap_err();
            assert_eq!(err, TransitionError::Forbidden { from: status, event: E::PaymentCompleted });
        }
    }

    #[test]
    fn ended_statuses_are_closed_to_new_payments() {
        for status in ALL_STATUSES.into_iter().filter(|s| s.is_ended()) {
            assert!(status.apply(E::PaymentCreated).is_err(), "{status} accepted a new payment");
        }
    }

    #[test]
    fn public_status_mapping() {
        assert_eq!(New.public_status(), PublicStatus::Created);
        assert_eq!(PaymentSystemCreate.public_status(), PublicStatus::Created);
        assert_eq!(PaymentSystemComplete.public_status(), PublicStatus::Processed);
        assert_eq!(ItemReplaced.public_status(), PublicStatus::Processed);
        assert_eq!(PaymentSystemRejectOnCreate.public_status(), PublicStatus::Rejected);
        assert_eq!(ProjectReject.public_status(), PublicStatus::Rejected);
        assert_eq!(PaymentSystemDeclined.public_status(), PublicStatus::Declined);
        assert_eq!(PaymentSystemCanceled.public_status(), PublicStatus::Canceled);
        assert_eq!(Refund.public_status(), PublicStatus::Refunded);
        assert_eq!(Chargeback.public_status(), PublicStatus::Chargeback);
    }

    #[test]
    fn recreation_rules() {
        assert!(New.can_be_recreated());
        assert!(PaymentSystemCreate.can_be_recreated());
        assert!(PaymentSystemDeclined.can_be_recreated());
        assert!(PaymentSystemRejectOnCreate.can_be_recreated());
        assert!(!PaymentSystemComplete.can_be_recreated());
        assert!(!ProjectComplete.can_be_recreated());
        assert!(!Refund.can_be_recreated());
    }

    #[test]
    fn status_strings() {
        for status in ALL_STATUSES {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Paid".parse::<OrderStatus>().is_err());
    }
}
