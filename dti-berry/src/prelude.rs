//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{DtiError, DtiResult};

pub use crate::volume::{montage_slices, plane, DtiVolume, NiftiHeaderAttr, Orientation};

pub use crate::consts::{files, MISSING_CODE, NA_TOKEN};

pub use crate::dataset::{self, data_dir, home_dataset_dir_with, read_sublist, subject_dti_dir};

pub use crate::motion::{
    exclude_b0_neighbours, Affine, DispSeries, Measure, MotionParams, RegistrationLog, SeriesStats,
    VolumeGroup,
};

pub use crate::qc::{cohort_report, CohortOptions, CohortTable, Column, SubjectMotion};
pub use crate::report::{qa_report, QaInputs};

pub use crate::tracking::{
    condition_seeds, seeds_from_volume, ConnectivityJob, ConnectivityMatrices, Streamlines,
};
pub use crate::matrix::{ConnMatrix, Threshold};

pub use crate::glm::{factorial_designs, RandomiseOptions, RandomiseSetup, Table};

pub use crate::plot::{Canvas, Colormap};
