//! Institutional admission rules applied to verified ID token claims.

use tracing::{debug, warn};

use super::claims::{EmailVerification, VerifiedClaims};
use super::error::PolicyRejection;

pub const DEFAULT_ALLOWED_DOMAIN: &str = "uci.edu";

/// Any `amr` entry containing one of these counts as a second factor.
pub const MFA_INDICATORS: [&str; 6] = ["mfa", "duo", "otp", "pwd+otp", "sms", "authenticator"];

const STUDENT_MARKER: &str = "student";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyConfig {
    allowed_domain: String,
    require_student: bool,
    require_mfa: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_domain: DEFAULT_ALLOWED_DOMAIN.to_string(),
            require_student: true,
            require_mfa: true,
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub fn new(allowed_domain: &str) -> Self {
        Self {
            allowed_domain: allowed_domain
                .trim()
                .trim_start_matches('@')
                .to_lowercase(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_require_student(mut self, required: bool) -> Self {
        self.require_student = required;
        self
    }

    #[must_use]
    pub fn with_require_mfa(mut self, required: bool) -> Self {
        self.require_mfa = required;
        self
    }

    #[must_use]
    pub fn allowed_domain(&self) -> &str {
        &self.allowed_domain
    }

    #[must_use]
    pub fn require_student(&self) -> bool {
        self.require_student
    }

    #[must_use]
    pub fn require_mfa(&self) -> bool {
        self.require_mfa
    }
}

/// Outcome of an admitted login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Trimmed, lower-cased email.
    pub email: String,
    pub is_student: bool,
    pub mfa_present: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Run the gates in order: domain, verified email, affiliation, MFA.
    ///
    /// The affiliation and MFA gates only reject when required by
    /// configuration; otherwise a miss is logged and the login proceeds.
    ///
    /// # Errors
    /// Returns the first gate that fails.
    pub fn evaluate(&self, claims: &VerifiedClaims) -> Result<PolicyDecision, PolicyRejection> {
        let email = claims
            .email
            .as_deref()
            .map(|email| email.trim().to_lowercase())
            .unwrap_or_default();

        let suffix = format!("@{}", self.config.allowed_domain);
        if email.len() <= suffix.len() || !email.ends_with(&suffix) {
            return Err(PolicyRejection::DomainRejected {
                domain: self.config.allowed_domain.clone(),
            });
        }

        if claims.email_verified == EmailVerification::Unverified {
            return Err(PolicyRejection::EmailUnverified);
        }

        let is_student = claims.affiliations.contains_any(&[STUDENT_MARKER]);
        if !is_student {
            if self.config.require_student {
                return Err(PolicyRejection::AffiliationRequired);
            }
            debug!(sub = %claims.sub, "no student affiliation, allowed by configuration");
        }

        let mfa_present = claims.amr.contains_any(&MFA_INDICATORS);
        if !mfa_present {
            if self.config.require_mfa {
                return Err(PolicyRejection::MfaRequired);
            }
            warn!(sub = %claims.sub, "no second factor in amr, allowed by configuration");
        }

        Ok(PolicyDecision {
            email,
            is_student,
            mfa_present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::claims::ClaimValues;
    use serde_json::{json, Value};

    fn claims(email: &str, verified: EmailVerification, affiliation: Value, amr: Value) -> VerifiedClaims {
        VerifiedClaims {
            sub: "uci|jdoe".to_string(),
            email: Some(email.to_string()),
            email_verified: verified,
            affiliations: ClaimValues::normalize([Some(&affiliation)]),
            amr: ClaimValues::normalize([Some(&amr)]),
            nonce: None,
        }
    }

    fn student(email: &str) -> VerifiedClaims {
        claims(email, EmailVerification::Verified, json!(["student"]), json!(["otp"]))
    }

    #[test]
    fn verified_student_with_otp_is_admitted() {
        let decision = PolicyEngine::default().evaluate(&student("  JDoe@UCI.edu "));
        assert_eq!(
            decision,
            Ok(PolicyDecision {
                email: "jdoe@uci.edu".to_string(),
                is_student: true,
                mfa_present: true,
            })
        );
    }

    #[test]
    fn foreign_domain_is_rejected_first() {
        // Every other gate would also fail; the domain gate must win.
        let claims = claims(
            "someone@gmail.com",
            EmailVerification::Unverified,
            json!([]),
            json!([]),
        );
        let result = PolicyEngine::default().evaluate(&claims);
        assert_eq!(
            result,
            Err(PolicyRejection::DomainRejected {
                domain: "uci.edu".to_string()
            })
        );
        assert_eq!(
            result.map_err(|err| err.to_string()),
            Err("Only @uci.edu accounts are allowed".to_string())
        );
    }

    #[test]
    fn lookalike_domains_and_missing_email_are_rejected() {
        let engine = PolicyEngine::default();
        for email in ["jdoe@notuci.edu", "jdoe@uci.edu.evil.com", "@uci.edu"] {
            assert!(matches!(
                engine.evaluate(&student(email)),
                Err(PolicyRejection::DomainRejected { .. })
            ));
        }
        let mut no_email = student("jdoe@uci.edu");
        no_email.email = None;
        assert!(matches!(
            engine.evaluate(&no_email),
            Err(PolicyRejection::DomainRejected { .. })
        ));
    }

    #[test]
    fn unverified_email_is_rejected_but_absent_flag_passes() {
        let engine = PolicyEngine::default();
        let unverified = claims(
            "jdoe@uci.edu",
            EmailVerification::Unverified,
            json!("student"),
            json!("otp"),
        );
        assert_eq!(engine.evaluate(&unverified), Err(PolicyRejection::EmailUnverified));

        let absent = claims(
            "jdoe@uci.edu",
            EmailVerification::Absent,
            json!("student"),
            json!("otp"),
        );
        assert!(engine.evaluate(&absent).is_ok());
    }

    #[test]
    fn affiliation_gate_required_or_advisory() {
        let staff = claims(
            "jdoe@uci.edu",
            EmailVerification::Verified,
            json!(["staff", "member"]),
            json!("duo"),
        );
        assert_eq!(
            PolicyEngine::default().evaluate(&staff),
            Err(PolicyRejection::AffiliationRequired)
        );

        let advisory = PolicyEngine::new(PolicyConfig::default().with_require_student(false));
        let decision = advisory.evaluate(&staff);
        assert!(matches!(decision, Ok(PolicyDecision { is_student: false, .. })));
    }

    #[test]
    fn affiliation_substring_matches_student_variants() {
        let grad = claims(
            "jdoe@uci.edu",
            EmailVerification::Verified,
            json!("Graduate-Student"),
            json!(["pwd+otp"]),
        );
        assert!(PolicyEngine::default().evaluate(&grad).is_ok());
    }

    #[test]
    fn mfa_gate_required_or_advisory() {
        let password_only = claims(
            "jdoe@uci.edu",
            EmailVerification::Verified,
            json!("student"),
            json!(["pwd"]),
        );
        assert_eq!(
            PolicyEngine::default().evaluate(&password_only),
            Err(PolicyRejection::MfaRequired)
        );

        let advisory = PolicyEngine::new(PolicyConfig::default().with_require_mfa(false));
        let decision = advisory.evaluate(&password_only);
        assert!(matches!(decision, Ok(PolicyDecision { mfa_present: false, .. })));
    }

    #[test]
    fn configured_domain_is_normalized() {
        let config = PolicyConfig::new(" @Example.EDU ");
        assert_eq!(config.allowed_domain(), "example.edu");
        let engine = PolicyEngine::new(config);
        assert!(engine.evaluate(&student("a@example.edu")).is_ok());
    }
}
