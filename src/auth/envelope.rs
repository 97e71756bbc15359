//! WS-Trust `RequestSecurityToken` envelope

use super::AuthError;
use crate::xml::Document;

/// SOAP 1.2 `RequestSecurityToken` against the `UsernameToken` profile.
pub const STS_REQUEST_TEMPLATE: &str = include_str!("sts_request.xml");

const USERNAME_PATH: &[&str] = &[
    "s:Envelope",
    "s:Header",
    "o:Security",
    "o:UsernameToken",
    "o:Username",
];
const PASSWORD_PATH: &[&str] = &[
    "s:Envelope",
    "s:Header",
    "o:Security",
    "o:UsernameToken",
    "o:Password",
];
const REALM_PATH: &[&str] = &[
    "s:Envelope",
    "s:Body",
    "t:RequestSecurityToken",
    "wsp:AppliesTo",
    "a:EndpointReference",
    "a:Address",
];
const TO_PATH: &[&str] = &["s:Envelope", "s:Header", "a:To"];

/// Fill the built-in template.
pub fn build_envelope(
    username: &str,
    password: &str,
    realm: &str,
    sts: &str,
) -> Result<String, AuthError> {
    build_envelope_from(STS_REQUEST_TEMPLATE, username, password, realm, sts)
}

/// Fill `template` with credentials, the token realm and the STS address.
///
/// Every required element must be present; `a:To` is optional.
pub fn build_envelope_from(
    template: &str,
    username: &str,
    password: &str,
    realm: &str,
    sts: &str,
) -> Result<String, AuthError> {
    let mut doc =
        Document::parse(template).map_err(|e| AuthError::TemplateMalformed(e.to_string()))?;

    set_required(&mut doc, USERNAME_PATH, username)?;
    set_required(&mut doc, PASSWORD_PATH, password)?;
    set_required(&mut doc, REALM_PATH, realm)?;

    if let Some(to) = doc.find_path_mut(TO_PATH) {
        to.set_text(sts);
    }

    doc.serialize()
        .map_err(|e| AuthError::TemplateMalformed(e.to_string()))
}

fn set_required(doc: &mut Document, path: &[&str], text: &str) -> Result<(), AuthError> {
    let element = doc
        .find_path_mut(path)
        .ok_or_else(|| AuthError::TemplateMalformed(format!("missing {}", path.join("/"))))?;
    element.set_text(text);
    Ok(())
}
