//! Reshapes raw device calibration records into structured intrinsics and
//! extrinsics. No numeric validation happens here.

use crate::types::{
    CameraIntrinsics, ImuParams, MotionExtrinsics, MotionIntrinsics, RawStreamCalibration,
    StreamExtrinsics, StreamIntrinsics,
};

// Offsets into a row-major 3x3 camera matrix.
const FX: usize = 0;
const CX: usize = 2;
const FY: usize = 4;
const CY: usize = 5;

fn lens_intrinsics(
    width: u16,
    height: u16,
    cam_mat: &[f64; 9],
    cam_dist: &[f64; 14],
) -> CameraIntrinsics {
    let mut coeffs = [0.0; 5];
    coeffs.copy_from_slice(&cam_dist[..5]);
    CameraIntrinsics {
        width,
        height,
        fx: cam_mat[FX],
        fy: cam_mat[FY],
        cx: cam_mat[CX],
        cy: cam_mat[CY],
        coeffs,
    }
}

/// Left/right intrinsics. The raw width spans both lenses, so each gets half.
pub fn stream_intrinsics(raw: &RawStreamCalibration) -> StreamIntrinsics {
    let width = raw.in_img_width / 2;
    let height = raw.in_img_height;
    StreamIntrinsics {
        left: lens_intrinsics(width, height, &raw.cam_mat1, &raw.cam_dist1),
        right: lens_intrinsics(width, height, &raw.cam_mat2, &raw.cam_dist2),
    }
}

pub fn stream_extrinsics(raw: &RawStreamCalibration) -> StreamExtrinsics {
    let mut rotation = [[0.0; 3]; 3];
    for (i, &v) in raw.rota_mat.iter().enumerate() {
        rotation[i / 3][i % 3] = v;
    }
    StreamExtrinsics {
        rotation,
        translation: raw.tran_mat,
    }
}

/// Motion calibration from the flash record, or `None` if the record is absent.
pub fn motion(params: &ImuParams) -> Option<(MotionIntrinsics, MotionExtrinsics)> {
    if !params.ok {
        return None;
    }
    Some((
        MotionIntrinsics {
            accel: params.in_accel,
            gyro: params.in_gyro,
        },
        params.ex_left_to_imu,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImuIntrinsics;

    fn raw() -> RawStreamCalibration {
        let mut raw = RawStreamCalibration {
            in_img_width: 2560,
            in_img_height: 720,
            cam_mat1: [700.0, 0.0, 640.5, 0.0, 701.0, 360.5, 0.0, 0.0, 1.0],
            cam_mat2: [710.0, 0.0, 630.5, 0.0, 711.0, 350.5, 0.0, 0.0, 1.0],
            rota_mat: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            tran_mat: [-120.0, 0.5, 0.25],
            ..Default::default()
        };
        for i in 0..14 {
            raw.cam_dist1[i] = i as f64 * 0.1;
            raw.cam_dist2[i] = -(i as f64) * 0.1;
        }
        raw
    }

    #[test]
    fn test_intrinsics_per_lens() {
        let r = raw();
        let si = stream_intrinsics(&r);

        assert_eq!(si.left.width, 1280);
        assert_eq!(si.left.height, 720);
        assert_eq!(si.left.fx, 700.0);
        assert_eq!(si.left.fy, 701.0);
        assert_eq!(si.left.cx, 640.5);
        assert_eq!(si.left.cy, 360.5);
        assert_eq!(&si.left.coeffs[..], &r.cam_dist1[..5]);

        assert_eq!(si.right.width, 1280);
        assert_eq!(si.right.fx, 710.0);
        assert_eq!(si.right.fy, 711.0);
        assert_eq!(si.right.cx, 630.5);
        assert_eq!(si.right.cy, 350.5);
        assert_eq!(&si.right.coeffs[..], &r.cam_dist2[..5]);
    }

    #[test]
    fn test_odd_width_truncates() {
        let mut r = raw();
        r.in_img_width = 1281;
        assert_eq!(stream_intrinsics(&r).left.width, 640);
    }

    #[test]
    fn test_extrinsics_reshape() {
        let ex = stream_extrinsics(&raw());
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(ex.rotation[i][j], (3 * i + j + 1) as f64);
            }
        }
        assert_eq!(ex.translation, [-120.0, 0.5, 0.25]);
    }

    #[test]
    fn test_motion_requires_ok() {
        let mut params = ImuParams::default();
        params.in_accel.bias = [0.1, 0.2, 0.3];
        assert!(motion(&params).is_none());

        params.ok = true;
        params.in_gyro = ImuIntrinsics {
            noise: [1.0, 2.0, 3.0],
            ..Default::default()
        };
        params.ex_left_to_imu.translation = [1.0, 0.0, -1.0];
        let (intr, extr) = motion(&params).unwrap();
        assert_eq!(intr.accel.bias, [0.1, 0.2, 0.3]);
        assert_eq!(intr.gyro.noise, [1.0, 2.0, 3.0]);
        assert_eq!(extr.translation, [1.0, 0.0, -1.0]);
    }
}
