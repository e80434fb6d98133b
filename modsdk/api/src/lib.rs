mod host;
mod types;
mod value;

pub use host::{
    lookup_type, AudioClip, GameObject, HostRuntime, Module, ModuleHandle, PayloadKind,
    PostfixHook, Scene, Search,
};
pub use types::{
    BoundMethod, CallFrame, Delegate, EventHandle, EventInfo, FieldHandle, FieldInfo, Getter,
    Invoker, MethodHandle, MethodInfo, PropertyHandle, PropertyInfo, Setter, Subscribe,
    TypeBuilder, TypeHandle, TypeInfo, Visibility, CORE_MODULE,
};
pub use value::{Object, ObjectRef, Placement, Value};

pub use glam::{Quat, Vec3};

use serde::{Deserialize, Serialize};

/// Faults raised by the foreign runtime while it is being driven.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostFault {
    #[error("member not found: {0}")]
    MemberNotFound(String),
    #[error("{method} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },
    #[error("cannot invoke open generic method {0}")]
    OpenGeneric(String),
    #[error("{method} takes {expected} type argument(s), got {got}")]
    GenericArity {
        method: String,
        expected: usize,
        got: usize,
    },
    #[error("delegate of type {got} cannot bind to a {expected} channel")]
    DelegateShape { expected: String, got: String },
    #[error("{0} requires a non-null target")]
    NullTarget(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Raised(String),
}

/// log level for mod logging
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl TryFrom<i32> for LogLevel {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            1 => Ok(LogLevel::Error),
            2 => Ok(LogLevel::Warn),
            3 => Ok(LogLevel::Info),
            4 => Ok(LogLevel::Debug),
            5 => Ok(LogLevel::Trace),
            other => Err(other),
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Logger handed to each mod; records carry the mod's name as target.
#[derive(Debug, Clone)]
pub struct ModLogger {
    target: String,
}

impl ModLogger {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        log::log!(target: self.target.as_str(), log::Level::from(level), "{}", message);
    }

    /// Entry point for levels coming from foreign code as plain integers.
    pub fn log_raw(&self, level: i32, message: &str) {
        match LogLevel::try_from(level) {
            Ok(level) => self.log(level, message),
            Err(unknown) => log::info!(target: self.target.as_str(), "[Unknown Level {}] {}", unknown, message),
        }
    }
}
