use froxel_core::{DepthSlicing, camera::Camera, config::ClusterSettings};
use froxel_renderer::{ClusterCoord, ClusterGrid, ClusterRecords, Light, assign_lights};
use glam::Vec3;

fn camera_at_origin() -> Camera {
    Camera {
        position: Vec3::ZERO,
        target: Vec3::NEG_Z,
        ..Camera::default()
    }
}

fn grid(dims: [u32; 3], max_lights_per_cluster: u32, slicing: DepthSlicing) -> ClusterGrid {
    let settings = ClusterSettings {
        dims,
        max_lights_per_cluster,
        depth_slicing: slicing,
        ..ClusterSettings::default()
    };
    ClusterGrid::new(&settings, &camera_at_origin())
}

fn run(grid: &ClusterGrid, max_lights_per_cluster: u32, lights: &[Light]) -> ClusterRecords {
    let mut records = ClusterRecords::new(grid.cluster_count(), max_lights_per_cluster);
    assign_lights(grid, camera_at_origin().compute_view_matrix(), lights, &mut records);
    records
}

#[test]
fn single_light_covering_everything_fills_every_cell() {
    let grid = grid([8, 4, 16], 1, DepthSlicing::Logarithmic);
    let lights = [Light {
        position: Vec3::ZERO,
        radius: 1000.0,
        color: Vec3::ONE,
    }];

    let records = run(&grid, 1, &lights);
    for index in 0..grid.cluster_count() {
        let record = records.record(index);
        assert_eq!(record.count, 1, "cell {:?}", grid.coord_of(index));
        assert_eq!(record.lights, &[0]);
    }
}

#[test]
fn no_active_lights_leaves_every_cell_empty() {
    for dims in [[1, 1, 1], [3, 5, 7], [32, 16, 64]] {
        let grid = grid(dims, 8, DepthSlicing::Logarithmic);
        let records = run(&grid, 8, &[]);
        assert!((0..grid.cluster_count()).all(|index| records.record(index).count == 0));
    }
}

#[test]
fn overflow_keeps_one_of_two_lights_in_a_single_cell() {
    let grid = grid([2, 2, 2], 1, DepthSlicing::Linear);
    let target = ClusterCoord::new(0, 0, 0);
    let bounds = grid.cell_bounds(target);
    let center = (bounds.min + bounds.max) * 0.5;
    let lights = [
        Light {
            position: center,
            radius: 0.01,
            color: Vec3::ONE,
        },
        Light {
            position: center + Vec3::splat(0.001),
            radius: 0.01,
            color: Vec3::X,
        },
    ];

    // Both spheres touch the target cell's volume and nothing else.
    for coord in grid.coords() {
        let hit = grid.cell_bounds(coord).intersects_sphere(center, 0.02);
        assert_eq!(hit, coord == target, "{coord:?}");
    }

    let records = run(&grid, 1, &lights);
    for coord in grid.coords() {
        let record = records.record(grid.index_of(coord));
        if coord == target {
            assert_eq!(record.count, 1);
            assert!(record.lights == [0] || record.lights == [1]);
        } else {
            assert_eq!(record.count, 0, "{coord:?}");
        }
    }
}

#[test]
fn overflow_truncates_in_scan_order() {
    let grid = grid([1, 1, 1], 3, DepthSlicing::Linear);
    let lights: Vec<Light> = (0..10)
        .map(|i| Light {
            position: Vec3::new(0.0, 0.0, -1.0 - i as f32),
            radius: 0.5,
            color: Vec3::ONE,
        })
        .collect();

    let records = run(&grid, 3, &lights);
    assert_eq!(records.record(0).lights, &[0, 1, 2]);
}
