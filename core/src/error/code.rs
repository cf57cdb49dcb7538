/// Stable numeric codes shared by every error surfaced to the command line.
///
/// Ranges: 1xxx configuration, 2xxx graph, 3xxx submission, 4xxx gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ConfigMissing = 1001,
    ConfigInvalid = 1002,
    InvalidFrameRange = 2001,
    GraphConsistency = 2002,
    CircularDependency = 2003,
    UnknownNode = 2004,
    MissingAuxFile = 3001,
    SubmissionFailed = 3002,
    PropertyFileIo = 3003,
    GatewayUnavailable = 4001,
    GatewayCommandFailed = 4002,
    GatewayTimeout = 4003,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_config(self) -> bool {
        (1000..2000).contains(&self.as_u16())
    }

    pub fn is_graph(self) -> bool {
        (2000..3000).contains(&self.as_u16())
    }
}
