mod policy;

pub use policy::{
    AutoRespondPolicy, BatchPolicy, ClassifierPolicy, DiagnosticsPolicy, EnginePolicy,
};
