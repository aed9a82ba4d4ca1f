use openssl::error::ErrorStack;
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
    io,
    path::PathBuf,
    time::Duration,
};

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by an external collaborator, kept as-is
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Everything that can go wrong while obtaining or storing a certificate
#[derive(Debug)]
pub enum Error {
    /// Failed to read or write a file
    Io(io::Error),
    /// No account has been stored for the email
    AccountNotFound(PathBuf),
    /// The stored account could not be decoded
    AccountCorrupt {
        /// Where the account is stored
        path: PathBuf,
        /// Why decoding failed
        source: bincode::error::DecodeError,
    },
    /// The account could not be encoded
    AccountEncode(bincode::error::EncodeError),
    /// The email cannot be used to name an account file
    InvalidEmail(String),
    /// The listen address is not in `host:port` form
    InvalidAddress(String),
    /// No PEM block was found in the certificate data
    MissingPemBlock,
    /// The first PEM block is not a certificate
    NotACertificate(String),
    /// The certificate DER could not be parsed
    MalformedCertificate(String),
    /// The certificate has neither a common name nor a DNS subject alternative name
    MissingDomain,
    /// Key generation, CSR construction or PEM export failed
    Crypto(ErrorStack),
    /// The HTTP-01 challenge responder could not be started
    ChallengeBind(BoxError),
    /// Error returned by the ACME engine
    Acme(BoxError),
    /// A certificate was requested before an account was bound to the client
    NoAccount,
    /// Issuance did not complete within the configured bound
    Timeout(Duration),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(_) => write!(f, "an i/o error occurred"),
            Self::AccountNotFound(path) => {
                write!(f, "no account stored at `{}`", path.display())
            }
            Self::AccountCorrupt { path, .. } => {
                write!(f, "the account stored at `{}` is corrupt", path.display())
            }
            Self::AccountEncode(_) => write!(f, "failed to encode the account"),
            Self::InvalidEmail(email) => {
                write!(f, "`{email}` cannot be used as an account email")
            }
            Self::InvalidAddress(address) => {
                write!(f, "`{address}` is not a valid host:port address")
            }
            Self::MissingPemBlock => {
                write!(f, "failed to decode PEM block containing certificate")
            }
            Self::NotACertificate(label) => {
                write!(f, "expected a CERTIFICATE PEM block, found `{label}`")
            }
            Self::MalformedCertificate(reason) => {
                write!(f, "failed to parse certificate: {reason}")
            }
            Self::MissingDomain => write!(f, "no domains in certificate"),
            Self::Crypto(_) => write!(f, "a cryptographic operation failed"),
            Self::ChallengeBind(_) => write!(f, "failed to start the http-01 challenge responder"),
            Self::Acme(_) => write!(f, "the acme client returned an error"),
            Self::NoAccount => write!(f, "no account is bound to the acme client"),
            Self::Timeout(after) => {
                write!(f, "certificate issuance timed out after {after:?}")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::AccountNotFound(_) => None,
            Self::AccountCorrupt { source, .. } => Some(source),
            Self::AccountEncode(e) => Some(e),
            Self::InvalidEmail(_) => None,
            Self::InvalidAddress(_) => None,
            Self::MissingPemBlock => None,
            Self::NotACertificate(_) => None,
            Self::MalformedCertificate(_) => None,
            Self::MissingDomain => None,
            Self::Crypto(e) => Some(e),
            Self::ChallengeBind(e) => Some(e.as_ref()),
            Self::Acme(e) => Some(e.as_ref()),
            Self::NoAccount => None,
            Self::Timeout(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ErrorStack> for Error {
    fn from(err: ErrorStack) -> Self {
        Self::Crypto(err)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::AccountEncode(err)
    }
}
