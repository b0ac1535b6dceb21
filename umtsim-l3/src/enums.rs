//! Layer-3 protocol enumerations
//!
//! Codes follow 3GPP TS 24.007 (protocol discriminators), TS 24.008
//! (MM/GMM/CC/SM message types and causes) and the RRC message ordering of
//! TS 25.331.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Protocol discriminator (TS 24.007 11.2.3.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProtocolDiscriminator {
    /// Group call control
    Gcc = 0,
    /// Broadcast call control
    Bcc = 1,
    /// SIM messages (reserved)
    Sim = 2,
    /// Call control, call related SS
    Cc = 3,
    /// GTP tunnelling
    Gtp = 4,
    /// Mobility management
    Mm = 5,
    /// Radio resources
    Rr = 6,
    /// GPRS mobility management
    Gmm = 8,
    /// Short message service
    Sms = 9,
    /// Session management
    Sm = 10,
    /// Non call related SS
    Ss = 11,
    /// Location services
    Ls = 12,
    /// Extension of the PD to one octet
    Ext = 14,
    /// Test procedures
    Test = 15,
}

impl ProtocolDiscriminator {
    /// Protocols whose messages carry a transaction identifier in the
    /// high nibble rather than a skip indicator.
    pub fn uses_transaction_id(self) -> bool {
        matches!(
            self,
            ProtocolDiscriminator::Cc
                | ProtocolDiscriminator::Sm
                | ProtocolDiscriminator::Ss
                | ProtocolDiscriminator::Sms
                | ProtocolDiscriminator::Gcc
                | ProtocolDiscriminator::Bcc
        )
    }
}

/// RRC message types in TS 25.331 order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RrMessageType {
    ActiveSetUpdate = 0,
    ActiveSetUpdateComplete = 1,
    ActiveSetUpdateFailure = 2,
    AssistanceDataDelivery = 3,
    CellChangeOrderFromUtran = 4,
    CellChangeOrderFromUtranFailure = 5,
    CellUpdate = 6,
    CellUpdateConfirmCcch = 7,
    CellUpdateConfirm = 8,
    CounterCheck = 9,
    CounterCheckResponse = 10,
    DownlinkDirectTransfer = 11,
    HandoverToUtranComplete = 12,
    InitialDirectTransfer = 13,
    HandoverFromUtranCommandGeranIu = 14,
    HandoverFromUtranCommandGsm = 15,
    HandoverFromUtranCommandCdma2000 = 16,
    HandoverFromUtranFailure = 17,
    MeasurementControl = 18,
    MeasurementControlFailure = 19,
    MeasurementReport = 20,
    PagingType1 = 21,
    PagingType2 = 22,
    PhysicalChannelReconfiguration = 23,
    PhysicalChannelReconfigurationComplete = 24,
    PhysicalChannelReconfigurationFailure = 25,
    PhysicalSharedChannelAllocation = 26,
    PuschCapacityRequest = 27,
    RadioBearerReconfiguration = 28,
    RadioBearerReconfigurationComplete = 29,
    RadioBearerReconfigurationFailure = 30,
    RadioBearerRelease = 31,
    RadioBearerReleaseComplete = 32,
    RadioBearerReleaseFailure = 33,
    RadioBearerSetup = 34,
    RadioBearerSetupComplete = 35,
    RadioBearerSetupFailure = 36,
    RrcConnectionReject = 37,
    RrcConnectionRelease = 38,
    RrcConnectionReleaseComplete = 39,
    RrcConnectionReleaseCcch = 40,
    RrcConnectionRequest = 41,
    RrcConnectionSetup = 42,
    RrcConnectionSetupComplete = 43,
    RrcStatus = 44,
    SecurityModeCommand = 45,
    SecurityModeComplete = 46,
    SecurityModeFailure = 47,
    SignallingConnectionRelease = 48,
    SignallingConnectionReleaseIndication = 49,
    SystemInformationBch = 50,
    SystemInformationFach = 51,
    SystemInformationChangeIndication = 52,
    TransportChannelReconfiguration = 53,
    TransportChannelReconfigurationComplete = 54,
    TransportChannelReconfigurationFailure = 55,
    TransportFormatCombinationControl = 56,
    TransportFormatCombinationControlFailure = 57,
    UeCapabilityEnquiry = 58,
    UeCapabilityInformation = 59,
    UeCapabilityInformationConfirm = 60,
    UplinkDirectTransfer = 61,
    UplinkPhysicalChannelControl = 62,
    UraUpdate = 63,
    UraUpdateConfirm = 64,
    UtranMobilityInformation = 65,
    UtranMobilityInformationConfirm = 66,
    UtranMobilityInformationFailure = 67,
}

/// MM message types (TS 24.008 10.4, table 10.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MmMessageType {
    ImsiDetachIndication = 0x01,
    LocationUpdatingAccept = 0x02,
    LocationUpdatingReject = 0x04,
    LocationUpdatingRequest = 0x08,
    CmServiceAccept = 0x21,
    CmServiceReject = 0x22,
    CmServiceAbort = 0x23,
    CmServiceRequest = 0x24,
    CmServicePrompt = 0x25,
    Abort = 0x29,
    MmStatus = 0x31,
    MmInformation = 0x32,
    PagingResponse = 0x33,
}

/// GMM message types (TS 24.008 10.4, table 10.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GmmMessageType {
    AttachRequest = 0x01,
    AttachAccept = 0x02,
    AttachComplete = 0x03,
    AttachReject = 0x04,
    DetachRequest = 0x05,
    DetachAccept = 0x06,
    RoutingAreaUpdateRequest = 0x08,
    RoutingAreaUpdateAccept = 0x09,
    RoutingAreaUpdateComplete = 0x0A,
    RoutingAreaUpdateReject = 0x0B,
    ServiceRequest = 0x0C,
    ServiceAccept = 0x0D,
    ServiceReject = 0x0E,
    GmmStatus = 0x20,
    GmmInformation = 0x21,
}

/// CC message types (TS 24.008 10.4, table 10.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CcMessageType {
    Alerting = 0x01,
    CallProceeding = 0x02,
    Progress = 0x03,
    Setup = 0x05,
    Connect = 0x07,
    CallConfirmed = 0x08,
    EmergencySetup = 0x0E,
    ConnectAcknowledge = 0x0F,
    Disconnect = 0x25,
    ReleaseComplete = 0x2A,
    Release = 0x2D,
    Status = 0x3D,
    Notify = 0x3E,
}

/// SM message types (TS 24.008 10.4, table 10.4a, with the 0x80 bit set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SmMessageType {
    ActivatePdpContextRequest = 0x81,
    ActivatePdpContextAccept = 0x82,
    ActivatePdpContextReject = 0x83,
    RequestPdpContextActivation = 0x84,
    RequestPdpContextActivationReject = 0x85,
    DeactivatePdpContextRequest = 0x86,
    DeactivatePdpContextAccept = 0x87,
    ModifyPdpContextRequestNetwork = 0x88,
    ModifyPdpContextAcceptMobile = 0x89,
    SmStatus = 0x95,
}

/// System information block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SibType {
    Master = 0,
    Type1 = 1,
    Type2 = 2,
    Type3 = 3,
    Type4 = 4,
    Type5 = 5,
    Type6 = 6,
    Type7 = 7,
    Type11 = 11,
    Type12 = 12,
    Type18 = 26,
}

/// RRC connection establishment cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EstablishmentCause {
    #[default]
    Cleared = 0,
    OriginatingConversational = 1,
    OriginatingStreaming = 2,
    OriginatingInteractive = 3,
    OriginatingBackground = 4,
    OriginatingSubscribedTraffic = 5,
    TerminatingConversational = 6,
    TerminatingStreaming = 7,
    TerminatingInteractive = 8,
    TerminatingBackground = 9,
    TerminatingSubscribedTraffic = 10,
    Registration = 11,
    Detach = 12,
    OriginatingHighPrioritySignalling = 13,
    OriginatingLowPrioritySignalling = 14,
    CallReestablishment = 15,
    TerminatingHighPrioritySignalling = 16,
    TerminatingLowPrioritySignalling = 17,
    TerminatingUnknown = 18,
}

impl EstablishmentCause {
    /// Establishment cause used when answering a page with `cause`.
    pub fn for_paging(cause: PagingCause) -> Self {
        match cause {
            PagingCause::ConversationalCall => EstablishmentCause::TerminatingConversational,
            PagingCause::StreamingCall => EstablishmentCause::TerminatingStreaming,
            PagingCause::InteractiveCall => EstablishmentCause::TerminatingInteractive,
            PagingCause::BackgroundCall => EstablishmentCause::TerminatingBackground,
            PagingCause::HighPrioritySignalling => EstablishmentCause::TerminatingHighPrioritySignalling,
            PagingCause::LowPrioritySignalling => EstablishmentCause::TerminatingLowPrioritySignalling,
            PagingCause::Unknown => EstablishmentCause::TerminatingUnknown,
        }
    }
}

/// CN paging cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PagingCause {
    ConversationalCall = 0,
    StreamingCall = 1,
    InteractiveCall = 2,
    BackgroundCall = 3,
    HighPrioritySignalling = 4,
    LowPrioritySignalling = 5,
    Unknown = 6,
}

/// Location updating type (TS 24.008 10.5.3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LocationUpdateType {
    #[default]
    Normal = 0,
    Periodic = 1,
    ImsiAttach = 2,
}

/// Attach type (TS 24.008 10.5.5.2), follow-on request bit included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AttachType {
    GprsOnlyFollowOn = 0x01,
    CombinedFollowOn = 0x03,
    GprsOnly = 0x09,
    Combined = 0x0B,
}

impl AttachType {
    /// Picks the attach type for the requested mode and follow-on flag.
    pub fn new(combined: bool, follow_on: bool) -> Self {
        match (combined, follow_on) {
            (false, true) => AttachType::GprsOnlyFollowOn,
            (true, true) => AttachType::CombinedFollowOn,
            (false, false) => AttachType::GprsOnly,
            (true, false) => AttachType::Combined,
        }
    }

    /// True if the follow-on request bit is set.
    pub fn follow_on(self) -> bool {
        matches!(self, AttachType::GprsOnlyFollowOn | AttachType::CombinedFollowOn)
    }
}

/// Routing area update type (TS 24.008 10.5.5.18)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RaUpdateType {
    RaUpdating = 0,
    CombinedRaLaUpdating = 1,
    CombinedRaLaUpdatingWithImsiAttach = 2,
    Periodic = 3,
}

/// GMM service type (TS 24.008 10.5.5.20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GmmServiceType {
    Signalling = 0,
    Data = 1,
    PagingResponse = 2,
}

/// CM service type (TS 24.008 10.5.3.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CmServiceType {
    MobileOriginatingCall = 1,
    EmergencyCall = 2,
    ShortMessage = 4,
    SupplementaryService = 8,
}

/// Reject cause shared by MM and GMM (TS 24.008 10.5.3.6 / 10.5.5.14)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RejectCause {
    ImsiUnknownInHlr = 2,
    IllegalMs = 3,
    ImsiUnknownInVlr = 4,
    IllegalMe = 6,
    GprsServicesNotAllowed = 7,
    MsIdentityCannotBeDerived = 9,
    ImplicitlyDetached = 10,
    PlmnNotAllowed = 11,
    LocationAreaNotAllowed = 12,
    RoamingNotAllowedInLa = 13,
    NetworkFailure = 17,
    Congestion = 22,
    ServiceOptionNotSupported = 32,
    ServiceOptionNotSubscribed = 33,
    ServiceOptionOutOfOrder = 34,
    NoPdpContextActivated = 40,
    ProtocolErrorUnspecified = 111,
}

impl RejectCause {
    /// Causes after which the subscriber must not retry in this area.
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            RejectCause::ImsiUnknownInHlr
                | RejectCause::IllegalMs
                | RejectCause::IllegalMe
                | RejectCause::GprsServicesNotAllowed
                | RejectCause::PlmnNotAllowed
                | RejectCause::LocationAreaNotAllowed
                | RejectCause::RoamingNotAllowedInLa
        )
    }
}

/// Call control cause (TS 24.008 10.5.4.11)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CcCause {
    UnassignedNumber = 1,
    NormalCallClearing = 16,
    UserBusy = 17,
    NoUserResponding = 18,
    NoAnswer = 19,
    CallRejected = 21,
    DestinationOutOfOrder = 27,
    NormalUnspecified = 31,
    NoCircuitAvailable = 34,
    NetworkOutOfOrder = 38,
    TemporaryFailure = 41,
    ResourcesUnavailable = 47,
    InvalidTransactionId = 81,
    MessageNotCompatibleWithState = 101,
    RecoveryOnTimerExpiry = 102,
}

/// Session management cause (TS 24.008 10.5.6.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SmCause {
    LlcOrSndcpFailure = 25,
    InsufficientResources = 26,
    MissingOrUnknownApn = 27,
    UserAuthenticationFailed = 29,
    ActivationRejectedByGgsn = 30,
    ActivationRejectedUnspecified = 31,
    ServiceOptionNotSupported = 32,
    RegularDeactivation = 36,
    QosNotAccepted = 37,
    NetworkFailure = 38,
    ReactivationRequired = 39,
    InvalidTransactionId = 81,
    ProtocolErrorUnspecified = 111,
}

/// Active set update action carried in ACTIVE SET UPDATE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ActiveSetAction {
    Add = 0,
    Remove = 1,
}
