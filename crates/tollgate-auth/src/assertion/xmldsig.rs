//! Enveloped XML signatures (RSA-SHA256).
//!
//! Verification checks, for a `ds:Signature` that is a direct child of the
//! signed element:
//!
//! 1. `SignatureMethod` is RSA-SHA256 and `DigestMethod` is SHA-256
//! 2. the `Reference` URI is empty or `#<ID>` of the signed element
//! 3. `DigestValue` is the SHA-256 of the canonical element without its
//!    signature
//! 4. `SignatureValue` is a valid PKCS#1 v1.5 signature over the canonical
//!    `SignedInfo`

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::xml::{self, NamespaceMap, XmlElement};
use crate::AuthResult;
use crate::error::AuthError;

pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Verifies the enveloped `signature` of `signed` against `key`.
///
/// Returns `false` for any structural problem as well as for a bad
/// signature; the caller only needs to know whether `key` vouches for the
/// element.
#[must_use]
pub fn verify_enveloped(signed: &XmlElement, signature: &XmlElement, key: &RsaPublicKey) -> bool {
    match check_enveloped(signed, signature, key) {
        Ok(()) => true,
        Err(reason) => {
            tracing::debug!(reason, "Enveloped signature rejected");
            false
        }
    }
}

fn check_enveloped(
    signed: &XmlElement,
    signature: &XmlElement,
    key: &RsaPublicKey,
) -> Result<(), &'static str> {
    let signed_info = signature.child("SignedInfo").ok_or("missing SignedInfo")?;

    let method = signed_info
        .child("SignatureMethod")
        .and_then(|m| m.attr("Algorithm"));
    if method != Some(RSA_SHA256) {
        return Err("unsupported signature method");
    }

    let reference = signed_info.child("Reference").ok_or("missing Reference")?;
    let uri = reference.attr("URI").unwrap_or("");
    if !uri.is_empty() {
        let expected = signed.attr("ID").map(|id| format!("#{id}"));
        if expected.as_deref() != Some(uri) {
            return Err("reference does not point at the signed element");
        }
    }

    let digest_method = reference
        .child("DigestMethod")
        .and_then(|m| m.attr("Algorithm"));
    if digest_method != Some(SHA256) {
        return Err("unsupported digest method");
    }

    let expected_digest = reference
        .child("DigestValue")
        .map(|d| decode_base64(&d.text()))
        .ok_or("missing DigestValue")?
        .ok_or("DigestValue is not base64")?;

    let canonical = signed.without_child("Signature").canonicalize();
    let digest = Sha256::digest(canonical.as_bytes());
    if digest.as_slice() != expected_digest.as_slice() {
        return Err("digest mismatch");
    }

    let signature_bytes = signature
        .child("SignatureValue")
        .map(|v| decode_base64(&v.text()))
        .ok_or("missing SignatureValue")?
        .ok_or("SignatureValue is not base64")?;
    let signature_value =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| "malformed SignatureValue")?;

    let scope = signature_scope(signed, signature);
    let signed_info_canonical = signed_info.canonicalize_in(&scope);

    VerifyingKey::<Sha256>::new(key.clone())
        .verify(signed_info_canonical.as_bytes(), &signature_value)
        .map_err(|_| "signature mismatch")
}

/// Namespaces in scope at `SignedInfo`: the signed element's and the
/// signature's own declarations.
fn signature_scope(signed: &XmlElement, signature: &XmlElement) -> NamespaceMap {
    let mut scope = signed.namespace_declarations();
    scope.extend(signature.namespace_declarations());
    scope
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

/// Signs the root element of `document` with an enveloped RSA-SHA256
/// signature placed after its `Issuer` (or first, when there is none).
///
/// Any existing signature on the root is replaced.
///
/// # Errors
///
/// Returns `InvalidGrant` if `document` is not well-formed, or `Internal`
/// if signing fails.
pub fn sign_enveloped(document: &str, key: &RsaPrivateKey) -> AuthResult<String> {
    let mut root = xml::parse(document)?.without_child("Signature");

    let reference_uri = root
        .attr("ID")
        .map(|id| format!("#{id}"))
        .unwrap_or_default();
    let digest = Sha256::digest(root.canonicalize().as_bytes());

    let signed_info = XmlElement::new("ds:SignedInfo")
        .with_child(XmlElement::new("ds:CanonicalizationMethod").with_attr("Algorithm", EXC_C14N))
        .with_child(XmlElement::new("ds:SignatureMethod").with_attr("Algorithm", RSA_SHA256))
        .with_child(
            XmlElement::new("ds:Reference")
                .with_attr("URI", reference_uri)
                .with_child(
                    XmlElement::new("ds:Transforms")
                        .with_child(
                            XmlElement::new("ds:Transform")
                                .with_attr("Algorithm", ENVELOPED_SIGNATURE),
                        )
                        .with_child(XmlElement::new("ds:Transform").with_attr("Algorithm", EXC_C14N)),
                )
                .with_child(XmlElement::new("ds:DigestMethod").with_attr("Algorithm", SHA256))
                .with_child(XmlElement::new("ds:DigestValue").with_text(STANDARD.encode(digest))),
        );

    let signature = XmlElement::new("ds:Signature").with_attr("xmlns:ds", DSIG_NS);
    let canonical = signed_info.canonicalize_in(&signature_scope(&root, &signature));

    let signature_value = SigningKey::<Sha256>::new(key.clone())
        .try_sign(canonical.as_bytes())
        .map_err(|e| AuthError::internal(format!("XML signing failed: {e}")))?;

    let signature = signature.with_child(signed_info).with_child(
        XmlElement::new("ds:SignatureValue").with_text(STANDARD.encode(signature_value.to_bytes())),
    );

    let position = root
        .children
        .iter()
        .position(|node| matches!(node, xml::XmlNode::Element(e) if e.local_name() == "Issuer"))
        .map_or(0, |index| index + 1);
    root.children
        .insert(position, xml::XmlNode::Element(signature));

    Ok(root.to_xml())
}
