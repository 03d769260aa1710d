//! Notification fan-out: one trait, three sinks (SMTP, SMS gateway, IM
//! webhook), the payload builders and the IM cadence policy.

pub mod email;
pub mod im;
pub mod payload;
pub mod sink;
pub mod sms;

pub use email::{EmailSink, SmtpSettings};
pub use im::{Cadence, ImMarker, ImSink};
pub use payload::{build as build_payload, Payload, SMS_MAX_CHARS};
pub use sink::{Notification, NotificationSink, SinkError};
pub use sms::{SmsSettings, SmsSink};
