//! Named index groups on the 468-point face mesh topology
//!
//! Image-left/right naming: `LEFT` groups sit on the left half of a frontal
//! photo (the subject's right side).

/// Number of points every landmark set carries
pub const FACE_MESH_POINTS: usize = 468;

pub const FOREHEAD: &[usize] = &[10, 109, 67, 103, 338, 297, 332, 151, 108, 337, 69, 299];

pub const UNDER_EYE_LEFT: &[usize] = &[111, 117, 118, 119, 120, 121, 229, 230, 231];
pub const UNDER_EYE_RIGHT: &[usize] = &[340, 346, 347, 348, 349, 350, 449, 450, 451];

pub const CHEEK_LEFT: &[usize] = &[50, 101, 118, 117, 123, 187, 205, 36, 116, 207];
pub const CHEEK_RIGHT: &[usize] = &[280, 330, 347, 346, 352, 411, 425, 266, 345, 427];

pub const NASOLABIAL_LEFT: &[usize] = &[129, 203, 206, 216, 92, 165, 167];
pub const NASOLABIAL_RIGHT: &[usize] = &[358, 423, 426, 436, 322, 391, 393];

pub const LIPS_OUTER: &[usize] = &[
    61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291, 375, 321, 405, 314, 17, 84, 181, 91, 146,
];

pub const CHIN: &[usize] = &[152, 148, 176, 149, 377, 400, 378, 199, 175, 171, 396];

pub const JAWLINE_LEFT: &[usize] = &[172, 136, 150, 58, 132, 93, 138, 135];
pub const JAWLINE_RIGHT: &[usize] = &[397, 365, 379, 288, 361, 323, 367, 364];
