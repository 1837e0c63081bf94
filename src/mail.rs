//! Outbound mail hand-off for signup links.
//! Registration never waits on the mailer: the send is spawned onto the
//! runtime after the store write commits, and a failure is logged rather than
//! surfaced. The `Mailer` trait keeps the delivery mechanism swappable; the
//! default wiring logs the link, tests record it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::store::RegistrationKind;

/// Template selected by the audience of the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    MedicalPracticeSignup,
    GpSignup,
    PatientSignup,
    HeadPharmacistSignup,
    PharmacistSignup,
    PharmacyTechnicianSignup,
}

impl EmailTemplate {
    pub fn for_kind(kind: RegistrationKind) -> Self {
        match kind {
            RegistrationKind::MedicalPracticeAdministrator => EmailTemplate::MedicalPracticeSignup,
            RegistrationKind::Gp => EmailTemplate::GpSignup,
            RegistrationKind::Patient => EmailTemplate::PatientSignup,
            RegistrationKind::HeadPharmacist => EmailTemplate::HeadPharmacistSignup,
            RegistrationKind::Pharmacist => EmailTemplate::PharmacistSignup,
            RegistrationKind::PharmacyTechnician => EmailTemplate::PharmacyTechnicianSignup,
        }
    }

    pub fn template_id(&self) -> &'static str {
        match self {
            EmailTemplate::MedicalPracticeSignup => "medical-practice-signup",
            EmailTemplate::GpSignup => "gp-signup",
            EmailTemplate::PatientSignup => "patient-signup",
            EmailTemplate::HeadPharmacistSignup => "head-pharmacist-signup",
            EmailTemplate::PharmacistSignup => "pharmacist-signup",
            EmailTemplate::PharmacyTechnicianSignup => "pharmacy-technician-signup",
        }
    }
}

/// Signup link embedded in the registration email. The token is a UUID so no
/// percent-encoding is needed.
pub fn signup_url(front_end_base_url: &str, token: &str) -> String {
    format!("{}/signup?token={}", front_end_base_url.trim_end_matches('/'), token)
}

pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, name: &str, template: EmailTemplate, signup_url: &str) -> anyhow::Result<()>;
}

/// Default mailer: logs the signup link instead of delivering it.
pub struct TracingMailer;

impl Mailer for TracingMailer {
    fn send(&self, to: &str, name: &str, template: EmailTemplate, signup_url: &str) -> anyhow::Result<()> {
        info!(
            target: "praxis::mail",
            "mail.send to={} name={} template={} url={}",
            to, name, template.template_id(), signup_url
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub name: String,
    pub template: EmailTemplate,
    pub signup_url: String,
}

/// Mailer that records every send; used by tests to pick up issued tokens.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, to: &str, name: &str, template: EmailTemplate, signup_url: &str) -> anyhow::Result<()> {
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            name: name.to_string(),
            template,
            signup_url: signup_url.to_string(),
        });
        Ok(())
    }
}

/// Fire-and-forget dispatch. The registration response does not wait on this;
/// a delivery failure is reported in the log and nowhere else.
pub fn dispatch_signup(
    mailer: Arc<dyn Mailer>,
    to: String,
    name: String,
    template: EmailTemplate,
    signup_url: String,
) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, &name, template, &signup_url) {
            warn!(target: "praxis::mail", "signup mail to {} failed: {}", to, e);
        }
    });
}
