//! `X509Certificate` extraction from ETSI TS 119 612 trust-list XML.

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

use crate::Error;

const CERTIFICATE_ELEMENT: &[u8] = b"X509Certificate";

/// Base64 certificate bodies found in a trust-list document.
#[derive(Debug, Default)]
pub struct CertificateEntries {
    /// Element text in document order, whitespace included.
    pub entries: Vec<String>,
    /// Syntax error that stopped extraction early, if any.
    pub error: Option<Error>,
}

impl CertificateEntries {
    /// `true` when the whole document was read.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Collect the text of every `X509Certificate` element, ignoring namespace
/// prefixes.
///
/// A malformed document stops extraction; entries read up to that point are
/// kept and the cause is returned in [`CertificateEntries::error`].
#[must_use]
pub fn extract_certificates(xml: &str) -> CertificateEntries {
    let mut reader = Reader::from_str(xml);
    let mut found = CertificateEntries::default();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == CERTIFICATE_ELEMENT => {
                current = Some(String::new());
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == CERTIFICATE_ELEMENT => {
                found.entries.push(String::new());
            }
            Ok(Event::Text(text)) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(text.as_ref()));
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(data.as_ref()));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == CERTIFICATE_ELEMENT => {
                if let Some(text) = current.take() {
                    found.entries.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    position = reader.buffer_position(),
                    entries = found.entries.len(),
                    error = %e,
                    "Trust list XML is malformed, stopping extraction"
                );
                found.error = Some(Error::Xml(e));
                break;
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_every_certificate_in_order() {
        let xml = "<Certificates>\
            <X509Certificate>AAA</X509Certificate>\
            <Other>ignored</Other>\
            <X509Certificate>BBB</X509Certificate>\
            </Certificates>";
        let found = extract_certificates(xml);
        assert!(found.is_complete());
        assert_eq!(found.entries, vec!["AAA", "BBB"]);
    }

    #[test]
    fn namespace_prefix_is_ignored() {
        let xml = r#"<tsl:TrustServiceStatusList xmlns:tsl="http://uri.etsi.org/02231/v2#" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
              <tsl:DigitalId><tsl:X509Certificate>
                MIIB
                AAAA
              </tsl:X509Certificate></tsl:DigitalId>
              <ds:X509Certificate>CCCC</ds:X509Certificate>
            </tsl:TrustServiceStatusList>"#;
        let found = extract_certificates(xml);
        assert_eq!(found.entries.len(), 2);
        assert!(found.entries[0].contains("MIIB"));
        assert_eq!(found.entries[1], "CCCC");
    }

    #[test]
    fn document_without_certificates_is_empty() {
        let found = extract_certificates("<Certificates></Certificates>");
        assert!(found.entries.is_empty());
        assert!(found.is_complete());
    }

    #[test]
    fn cdata_content_is_collected() {
        let found = extract_certificates("<X509Certificate><![CDATA[QUJD]]></X509Certificate>");
        assert_eq!(found.entries, vec!["QUJD"]);
    }

    #[test]
    fn syntax_error_keeps_earlier_entries() {
        // GIVEN: a valid entry followed by a mismatched closing tag
        let xml = "<L><X509Certificate>AAA</X509Certificate><X509Certificate>BBB</Wrong></L>";
        // WHEN: extracting
        let found = extract_certificates(xml);
        // THEN: the first entry survives and the error is reported
        assert_eq!(found.entries, vec!["AAA"]);
        assert!(matches!(found.error, Some(Error::Xml(_))));
    }
}
