//! WS-Trust `RequestSecurityTokenResponse` parsing

use super::AuthError;
use crate::xml::Document;

const RESPONSE_PATH: &[&str] = &["S:Envelope", "S:Body", "wst:RequestSecurityTokenResponse"];
const REALM_PATH: &[&str] = &["wsp:AppliesTo", "wsa:EndpointReference", "wsa:Address"];
const TOKEN_PATH: &[&str] = &["wst:RequestedSecurityToken", "wsse:BinarySecurityToken"];
const FAULT_REASON_PATH: &[&str] = &["S:Envelope", "S:Body", "S:Fault", "S:Reason", "S:Text"];
const FAULT_DETAIL_PATH: &[&str] = &[
    "S:Envelope",
    "S:Body",
    "S:Fault",
    "S:Detail",
    "psf:error",
    "psf:internalerror",
    "psf:text",
];

/// Pull the binary security token out of an STS response.
///
/// When the response echoes an `AppliesTo` address it must equal `realm`
/// exactly; a token scoped to another site is refused. The token is
/// percent-decoded before it is returned.
pub fn extract_token(response_xml: &str, realm: &str) -> Result<String, AuthError> {
    let doc = Document::parse(response_xml)
        .map_err(|e| AuthError::TokenNotFound(format!("unparseable STS response: {}", e)))?;

    let Some(rstr) = doc.find_path(RESPONSE_PATH) else {
        return Err(AuthError::TokenNotFound(
            fault_reason(&doc).unwrap_or_else(|| "no RequestSecurityTokenResponse".to_string()),
        ));
    };

    if let Some(address) = rstr.find(REALM_PATH) {
        let actual = address.text().unwrap_or_default();
        if actual != realm {
            return Err(AuthError::RealmMismatch {
                expected: realm.to_string(),
                actual,
            });
        }
    }

    let raw = rstr
        .find(TOKEN_PATH)
        .and_then(|el| el.text())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::TokenNotFound("no BinarySecurityToken".to_string()))?;

    let token = urlencoding::decode(&raw)
        .map_err(|e| AuthError::TokenNotFound(format!("token is not valid UTF-8: {}", e)))?;

    Ok(token.into_owned())
}

/// Human-readable reason from a SOAP fault, preferring the STS's own detail text.
fn fault_reason(doc: &Document) -> Option<String> {
    doc.find_path(FAULT_DETAIL_PATH)
        .or_else(|| doc.find_path(FAULT_REASON_PATH))
        .and_then(|el| el.text())
}
