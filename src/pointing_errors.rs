use thiserror::Error;

#[derive(Error, Debug)]
pub enum PointingError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Unknown frame: {0}")]
    UnknownFrame(String),

    #[error("No current instrument has been set")]
    NoCurrentInstrument,

    #[error("Time must be finite, got {0}")]
    NonFiniteTime(f64),

    #[error("Kernel pool is missing values for key {0}")]
    MissingKernelValue(String),

    #[error("Kernel pool does not have values of type {expected} for key {key}")]
    WrongKernelValueType { key: String, expected: &'static str },

    #[error("Kernel pool has {found} values, not expected number {expected} for key {key}")]
    WrongKernelValueCount {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported FOV shape {shape} for instrument frame {frame}")]
    UnsupportedFovShape { shape: String, frame: String },

    #[error("FOV class spec CORNERS is not supported (instrument frame {0})")]
    CornersFovNotSupported(String),

    #[error(
        "Illegal FOV_CLASS_SPEC {class_spec}; must be either \"CORNERS\" or \"ANGLES\" for instrument frame {frame}"
    )]
    InvalidFovClassSpec { class_spec: String, frame: String },

    #[error("Unsupported FOV angle units {units} for instrument frame {frame}")]
    UnsupportedFovAngleUnits { units: String, frame: String },

    #[error("FOV half angle {value} under {key} is outside (0, 90) degrees")]
    InvalidFovAngle { key: String, value: f64 },

    #[error("Instruments {first} and {second} are both named {name}")]
    DuplicateInstrumentName {
        name: String,
        first: i32,
        second: i32,
    },

    #[error("FOV reference vector is parallel to the boresight for instrument frame {0}")]
    DegenerateFovReference(String),

    #[error("No kernels were loaded")]
    NoKernelsLoaded,

    #[error("Metakernel {path} has {symbols} PATH_SYMBOLS but {values} PATH_VALUES")]
    MetaKernelPathMismatch {
        path: String,
        symbols: usize,
        values: usize,
    },

    #[error("Unable to parse text kernel {path}: {reason}")]
    TextKernelParse { path: String, reason: String },

    #[error("Unable to load kernel {path}: {reason}")]
    KernelLoad { path: String, reason: String },

    #[error("Unsupported kernel file: {0}")]
    UnsupportedKernel(String),

    #[error("No ephemeris data for {target} relative to {observer} in frame {frame}")]
    EphemerisUnavailable {
        target: String,
        observer: String,
        frame: String,
    },

    #[error("No frame transform from {from} to {to}")]
    FrameUnavailable { from: String, to: String },

    #[error("Unable to parse UTC string: {0}")]
    InvalidUtcString(String),

    #[error("Unable to parse pointing record field {key}: {reason}")]
    PointingRecordParse { key: String, reason: String },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl PartialEq for PointingError {
    fn eq(&self, other: &Self) -> bool {
        use PointingError::*;
        match (self, other) {
            (UnknownInstrument(a), UnknownInstrument(b)) => a == b,
            (UnknownFrame(a), UnknownFrame(b)) => a == b,
            (NonFiniteTime(a), NonFiniteTime(b)) => a.to_bits() == b.to_bits(),
            (MissingKernelValue(a), MissingKernelValue(b)) => a == b,
            (
                WrongKernelValueType {
                    key: k1,
                    expected: e1,
                },
                WrongKernelValueType {
                    key: k2,
                    expected: e2,
                },
            ) => k1 == k2 && e1 == e2,
            (
                WrongKernelValueCount {
                    key: k1,
                    expected: e1,
                    found: f1,
                },
                WrongKernelValueCount {
                    key: k2,
                    expected: e2,
                    found: f2,
                },
            ) => k1 == k2 && e1 == e2 && f1 == f2,
            (
                UnsupportedFovShape {
                    shape: s1,
                    frame: f1,
                },
                UnsupportedFovShape {
                    shape: s2,
                    frame: f2,
                },
            ) => s1 == s2 && f1 == f2,
            (CornersFovNotSupported(a), CornersFovNotSupported(b)) => a == b,
            (
                InvalidFovClassSpec {
                    class_spec: c1,
                    frame: f1,
                },
                InvalidFovClassSpec {
                    class_spec: c2,
                    frame: f2,
                },
            ) => c1 == c2 && f1 == f2,
            (
                UnsupportedFovAngleUnits {
                    units: u1,
                    frame: f1,
                },
                UnsupportedFovAngleUnits {
                    units: u2,
                    frame: f2,
                },
            ) => u1 == u2 && f1 == f2,
            (InvalidFovAngle { key: k1, value: v1 }, InvalidFovAngle { key: k2, value: v2 }) => {
                k1 == k2 && v1.to_bits() == v2.to_bits()
            }
            (
                DuplicateInstrumentName {
                    name: n1,
                    first: a1,
                    second: b1,
                },
                DuplicateInstrumentName {
                    name: n2,
                    first: a2,
                    second: b2,
                },
            ) => n1 == n2 && a1 == a2 && b1 == b2,
            (DegenerateFovReference(a), DegenerateFovReference(b)) => a == b,
            (
                MetaKernelPathMismatch {
                    path: p1,
                    symbols: s1,
                    values: v1,
                },
                MetaKernelPathMismatch {
                    path: p2,
                    symbols: s2,
                    values: v2,
                },
            ) => p1 == p2 && s1 == s2 && v1 == v2,
            (
                TextKernelParse {
                    path: p1,
                    reason: r1,
                },
                TextKernelParse {
                    path: p2,
                    reason: r2,
                },
            ) => p1 == p2 && r1 == r2,
            (UnsupportedKernel(a), UnsupportedKernel(b)) => a == b,
            (KernelLoad { path: p1, reason: r1 }, KernelLoad { path: p2, reason: r2 }) => {
                p1 == p2 && r1 == r2
            }
            (
                EphemerisUnavailable {
                    target: t1,
                    observer: o1,
                    frame: f1,
                },
                EphemerisUnavailable {
                    target: t2,
                    observer: o2,
                    frame: f2,
                },
            ) => t1 == t2 && o1 == o2 && f1 == f2,
            (FrameUnavailable { from: f1, to: t1 }, FrameUnavailable { from: f2, to: t2 }) => {
                f1 == f2 && t1 == t2
            }
            (InvalidUtcString(a), InvalidUtcString(b)) => a == b,
            (
                PointingRecordParse { key: k1, reason: r1 },
                PointingRecordParse { key: k2, reason: r2 },
            ) => k1 == k2 && r1 == r2,

            // Wrapped errors are not comparable: same variant means equal
            (IoError(_), IoError(_)) => true,
            (JsonError(_), JsonError(_)) => true,

            (NoCurrentInstrument, NoCurrentInstrument) => true,
            (NoKernelsLoaded, NoKernelsLoaded) => true,

            _ => false,
        }
    }
}
