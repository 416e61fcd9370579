//! Core types and domain rules for aptest.
//!
//! This crate provides the foundational types used throughout the aptest service:
//!
//! - **Identifiers**: `AccountId`, `OrderId`
//! - **Accounts**: `Account`, `InstituteRef`, `InstituteInfo`, `Member`
//! - **Catalog**: `Product`, `ProductType`
//! - **Choices**: `ChoiceResult`, `AnswerProgress`, review eligibility
//! - **Payments**: `Payment`, `PaymentStatus` state machine, `PaymentLogEntry`
//! - **Identity**: `IdentityBundle` and lookup-key selection
//! - **Signup**: `SignupForm` validation
//!
//! Everything here is pure; persistence lives in `aptest-store`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod catalog;
pub mod choice;
pub mod error;
pub mod flag;
pub mod identity;
pub mod ids;
pub mod payment;
pub mod signup;

pub use account::{Account, InstituteInfo, InstituteRef, Member, TurnLookup};
pub use catalog::{default_signup_product, Product, ProductType};
pub use choice::{
    review_eligibility, AnswerProgress, ChoiceDetail, ChoiceResult, DoneState, LatestChoice,
    ProductSelection, ReviewCode, TestRow,
};
pub use error::{DomainError, Result};
pub use flag::Flag;
pub use identity::{IdentityBundle, IdentityKey};
pub use ids::{AccountId, IdError, OrderId};
pub use payment::{
    NewPayment, Payment, PaymentApproval, PaymentEvent, PaymentLogEntry, PaymentStatus,
    DEFAULT_PAYMENT_METHOD,
};
pub use signup::{BirthDate, Gender, NewPerson, NewPersonalAccount, SignupForm};
