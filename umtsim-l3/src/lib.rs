//! UMTS Layer-3 signalling library
//!
//! Message framing for the UE signalling stack:
//! - RRC (radio resource control)
//! - MM and GMM (CS and PS mobility management)
//! - CC (call control)
//! - SM (session management)
//!
//! # Message Structure
//!
//! Every message starts with the 4-byte [`L3Header`]: protocol discriminator
//! and transaction identifier packed in one byte, the message type and two
//! reserved bytes. NAS messages are carried in RRC direct transfers behind a
//! one byte [`DomainTag`].
//!
//! # Example
//!
//! ```rust
//! use umtsim_l3::{CcMessage, NasPdu, TransactionId};
//!
//! let pdu = NasPdu::Cc { ti: TransactionId::new(1, false), msg: CcMessage::Alerting };
//! let bytes = pdu.encode();
//! assert_eq!(bytes[0], 0x31);
//! assert_eq!(NasPdu::decode(bytes).unwrap(), pdu);
//! ```

pub mod codec;
pub mod enums;
pub mod header;
pub mod messages;

pub use codec::{CodecError, CodecResult, L3Message};
pub use enums::{
    ActiveSetAction, AttachType, CcCause, CcMessageType, CmServiceType, EstablishmentCause,
    GmmMessageType, GmmServiceType, LocationUpdateType, MmMessageType, PagingCause,
    ProtocolDiscriminator, RaUpdateType, RejectCause, RrMessageType, SibType, SmCause,
    SmMessageType,
};
pub use header::{DomainTag, HeaderError, L3Header, TransactionId};
pub use messages::{
    CcMessage, CellMeasurement, GmmMessage, MmMessage, NasPdu, RrcMessage, SmMessage,
    SystemInformationBlock,
};
