mod artifact;
mod forecaster;
mod registry;
mod selectors;

pub use artifact::{load_model_file, ConstantModel, LinearModel, ModelArtifact};
pub use forecaster::{predict, Forecaster, ForecasterMut, ModelHandle, SerialForecaster};
pub use registry::{ModelCatalog, ModelVersion};
pub use selectors::{VersionSelection, VersionSelector};
