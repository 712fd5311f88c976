//! Public-key parameter extraction for key-size reporting.

use x509_parser::asn1_rs::{Any, FromDer, Integer, Oid, Sequence};
use x509_parser::oid_registry::{
    OID_EC_P256, OID_KEY_TYPE_DSA, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_NIST_EC_P384,
    OID_NIST_EC_P521, OID_PKCS1_RSAENCRYPTION,
};
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

/// Algorithm-tagged public-key parameters relevant to key size.
///
/// Integers are big-endian unsigned magnitudes; leading zero octets are
/// permitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParameters {
    /// RSA key: the modulus `n`.
    Rsa {
        /// Modulus bytes.
        modulus: Vec<u8>,
    },
    /// DSA key: the prime modulus `p` from the domain parameters.
    Dsa {
        /// Prime modulus bytes.
        p: Vec<u8>,
    },
    /// Elliptic-curve key: the size of the underlying field.
    Ec {
        /// Field size in bits.
        field_size: u32,
    },
    /// Any other or unrecognised algorithm.
    Other {
        /// Dotted algorithm OID, when known.
        algorithm: String,
    },
}

impl KeyParameters {
    /// EC parameters for a prime field `p`; the field size is the bit length of `p`.
    #[must_use]
    pub fn ec_prime_field(prime: &[u8]) -> Self {
        Self::Ec {
            field_size: bit_length(prime),
        }
    }

    /// Extract key parameters from a parsed `SubjectPublicKeyInfo`.
    #[must_use]
    pub fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Self {
        let algorithm = &spki.algorithm.algorithm;
        let parameters = spki.algorithm.parameters.as_ref();
        let parsed = if *algorithm == OID_PKCS1_RSAENCRYPTION {
            match spki.parsed() {
                Ok(PublicKey::RSA(rsa)) => Some(Self::Rsa {
                    modulus: rsa.modulus.to_vec(),
                }),
                _ => None,
            }
        } else if *algorithm == OID_KEY_TYPE_DSA {
            parameters.and_then(dsa_prime).map(|p| Self::Dsa { p })
        } else if *algorithm == OID_KEY_TYPE_EC_PUBLIC_KEY {
            ec_field_size(spki, parameters).map(|field_size| Self::Ec { field_size })
        } else {
            None
        };
        parsed.unwrap_or_else(|| Self::Other {
            algorithm: algorithm.to_id_string(),
        })
    }

    /// Key size in bits, or `-1` for an unrecognised key kind.
    #[must_use]
    pub fn key_size(&self) -> i32 {
        let bits = match self {
            Self::Rsa { modulus } => bit_length(modulus),
            Self::Dsa { p } => bit_length(p),
            Self::Ec { field_size } => *field_size,
            Self::Other { .. } => return -1,
        };
        i32::try_from(bits).unwrap_or(i32::MAX)
    }
}

/// Bit length of a big-endian unsigned integer.
#[must_use]
pub fn bit_length(bytes: &[u8]) -> u32 {
    let Some(start) = bytes.iter().position(|&b| b != 0) else {
        return 0;
    };
    let significant = &bytes[start..];
    let high_bits = 8 - significant[0].leading_zeros();
    let rest_bits = u32::try_from((significant.len() - 1) * 8).unwrap_or(u32::MAX);
    high_bits.saturating_add(rest_bits)
}

// ─────────────────────────────────────────────────────────────────────────────
// Algorithm parameters
// ─────────────────────────────────────────────────────────────────────────────

/// `Dss-Parms ::= SEQUENCE { p INTEGER, q INTEGER, g INTEGER }`
fn dsa_prime(params: &Any<'_>) -> Option<Vec<u8>> {
    let dss = params.as_sequence().ok()?;
    let (_, p) = Integer::from_der(&dss.content).ok()?;
    Some(p.as_ref().to_vec())
}

fn ec_field_size(spki: &SubjectPublicKeyInfo<'_>, params: Option<&Any<'_>>) -> Option<u32> {
    let params = params?;
    if let Ok(curve) = params.as_oid() {
        return named_curve_field_size(&curve).or_else(|| point_field_size(spki));
    }
    if params.as_sequence().is_ok() {
        return specified_prime_field_size(params);
    }
    point_field_size(spki)
}

fn named_curve_field_size(curve: &Oid<'_>) -> Option<u32> {
    if *curve == OID_EC_P256 {
        Some(256)
    } else if *curve == OID_NIST_EC_P384 {
        Some(384)
    } else if *curve == OID_NIST_EC_P521 {
        Some(521)
    } else {
        None
    }
}

/// `ECParameters ::= SEQUENCE { version, fieldID SEQUENCE { fieldType OID, prime INTEGER }, ... }`
fn specified_prime_field_size(params: &Any<'_>) -> Option<u32> {
    let ec_params = params.as_sequence().ok()?;
    let (rest, _version) = Integer::from_der(&ec_params.content).ok()?;
    let (_, field_id) = Sequence::from_der(rest).ok()?;
    let (field_params, _field_type) = Oid::from_der(&field_id.content).ok()?;
    let (_, prime) = Integer::from_der(field_params).ok()?;
    Some(bit_length(prime.as_ref()))
}

/// Curves without a registered field size: derived from the public point.
///
/// Exact for uncompressed points on byte-aligned fields (brainpool,
/// secp224r1, secp256k1).
fn point_field_size(spki: &SubjectPublicKeyInfo<'_>) -> Option<u32> {
    match spki.parsed() {
        Ok(PublicKey::EC(point)) => u32::try_from(point.key_size())
            .ok()
            .filter(|&bits| bits > 0),
        _ => None,
    }
}
