use amitrace_core::AmitraceError;

use crate::commit::GpgSignature;
use crate::object::ObjectType;
use crate::oid::ObjectId;
use crate::signature::Signature;

const BEGIN_PGP: &str = "\n-----BEGIN PGP SIGNATURE-----\n";
const END_PGP: &str = "\n-----END PGP SIGNATURE-----";

/// A decoded annotated tag.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    /// Object the tag points at.
    pub object: ObjectId,
    pub kind: Option<ObjectType>,
    pub tagger: Signature,
    /// Message without the trailing PGP block.
    pub message: String,
    pub signature: Option<GpgSignature>,
}

/// Decode the canonical text of a tag object.
///
/// An inline PGP block at the end of the message is split off into
/// [`Tag::signature`], with everything before it as the signed payload.
///
/// # Examples
///
/// ```
/// use amitrace_git::tag::decode_tag;
///
/// let raw = b"object 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
/// type commit\n\
/// tag v1.0\n\
/// tagger T <t@x> 1700000000 +0000\n\
/// \n\
/// release\n";
/// let tag = decode_tag(raw).unwrap();
/// assert_eq!(tag.name, "v1.0");
/// assert_eq!(tag.message, "release\n");
/// assert!(tag.signature.is_none());
/// ```
pub fn decode_tag(data: &[u8]) -> Result<Tag, AmitraceError> {
    let mut object = None;
    let mut kind = None;
    let mut name = String::new();
    let mut tagger = Signature::default();
    let mut message = String::new();

    let mut pos = 0;
    while pos < data.len() {
        let Some(eol) = data[pos..].iter().position(|&b| b == b'\n') else {
            break;
        };
        if eol == 0 {
            message = String::from_utf8_lossy(&data[pos + 1..]).into_owned();
            break;
        }
        let line = &data[pos..pos + eol];
        let (key, value) = match line.iter().position(|&b| b == b' ') {
            Some(sp) => (&line[..sp], &line[sp + 1..]),
            None => (line, &b""[..]),
        };
        match key {
            b"object" => {
                let hex = std::str::from_utf8(value)
                    .map_err(|_| AmitraceError::Decode("tag object id is not ASCII".into()))?;
                object = Some(ObjectId::from_hex(hex)?);
            }
            b"type" => kind = std::str::from_utf8(value).ok().and_then(|s| s.parse().ok()),
            b"tag" => name = String::from_utf8_lossy(value).into_owned(),
            b"tagger" => tagger = Signature::decode(value),
            _ => {}
        }
        pos += eol + 1;
    }

    let object = object.ok_or_else(|| AmitraceError::Decode("tag has no object header".into()))?;

    let mut signature = None;
    if let Some(idx) = message.rfind(BEGIN_PGP).filter(|&i| i > 0) {
        if let Some(end) = message[idx..].find(END_PGP).filter(|&e| e > 0) {
            let raw = String::from_utf8_lossy(data);
            let payload_end = raw.rfind(BEGIN_PGP).map(|i| i + 1).unwrap_or(0);
            signature = Some(GpgSignature {
                signature: message[idx + 1..idx + end + END_PGP.len()].to_string(),
                payload: raw[..payload_end].to_string(),
            });
            message.truncate(idx + 1);
        }
    }

    Ok(Tag {
        name,
        object,
        kind,
        tagger,
        message,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_tag_splits_signature() {
        let raw = "object 1111111111111111111111111111111111111111\n\
                   type commit\n\
                   tag v2\n\
                   tagger Rel <rel@x> 1700000000 +0000\n\
                   \n\
                   Release two\n\
                   -----BEGIN PGP SIGNATURE-----\n\
                   \n\
                   xyz\n\
                   -----END PGP SIGNATURE-----\n";
        let tag = decode_tag(raw.as_bytes()).unwrap();
        assert_eq!(tag.kind, Some(ObjectType::Commit));
        assert_eq!(tag.message, "Release two\n");
        let sig = tag.signature.unwrap();
        assert!(sig.signature.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert!(sig.signature.ends_with("-----END PGP SIGNATURE-----"));
        assert!(sig.payload.ends_with("Release two\n"));
        assert!(!sig.payload.contains("BEGIN PGP"));
    }

    #[test]
    fn tag_without_object_is_an_error() {
        assert!(decode_tag(b"type commit\n\nmsg").is_err());
    }

    #[test]
    fn tag_without_message() {
        let tag = decode_tag(b"object 1111111111111111111111111111111111111111\ntype tree\n").unwrap();
        assert_eq!(tag.kind, Some(ObjectType::Tree));
        assert!(tag.message.is_empty());
    }
}
