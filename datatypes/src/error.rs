use snafu::Snafu;

use crate::primitives::Coordinate2D;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "The conditions ll.x <= ur.x && ll.y <= ur.y are not met by ll:{} ur:{}",
        lower_left_coordinate,
        upper_right_coordinate
    ))]
    InvalidBoundingBox {
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    },

    #[snafu(display("InvalidSpatialReferenceString: {}", spatial_reference_string))]
    InvalidSpatialReferenceString {
        spatial_reference_string: String,
    },

    #[snafu(display("ParseU32: {}", source))]
    ParseU32 {
        source: <u32 as std::str::FromStr>::Err,
    },

    #[snafu(display("Unsupported coordinate reference system: {}", crs))]
    UnsupportedCrs {
        crs: String,
    },

    #[snafu(display("Reprojection from {} failed: {}", crs, source))]
    Reprojection {
        crs: String,
        source: proj::ProjError,
    },

    #[snafu(display("Invalid geometry: {}", details))]
    InvalidGeometry {
        details: String,
    },
}

