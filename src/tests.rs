#[cfg(test)]
mod tests {
    use crate::automaton::{
        Cell, Frame, FrameKind, GridSnapshot, Point, RunStatus, SchedulerState, StepOutcome,
        StopStatus,
    };
    use crate::config::SimConfig;
    use crate::ffi::*;
    use crate::rule::{moore_neighborhood, RuleBody, RuleSpec};
    use crate::session::{CaService, Session};
    use std::ffi::{c_char, CString};
    use std::ptr;
    use std::thread;
    use std::time::Duration;

    fn session(width: i32, height: i32) -> Session {
        Session::new(SimConfig {
            grid_width: width,
            grid_height: height,
            worker_threads: 2,
            ..SimConfig::default()
        })
        .unwrap()
    }

    fn conway() -> RuleSpec {
        RuleSpec::new(
            2,
            0,
            moore_neighborhood(false),
            RuleBody::life_like("B3/S23").unwrap(),
        )
    }

    fn replay(grid: &mut GridSnapshot, frame: &Frame) {
        for &cell in frame.cells() {
            grid.set(cell);
        }
    }

    #[test]
    fn test_lone_cell_on_3x3_torus_dies() {
        let session = session(3, 3);
        session.init_ca(conway()).unwrap();
        session
            .init_grid(GridSnapshot::from_rows(&[vec![0, 0, 0], vec![0, 1, 0], vec![0, 0, 0]]).unwrap())
            .unwrap();

        // Every other cell sees the live cell exactly once
        for point in session.get_grid().points() {
            if point != Point::new(1, 1) {
                assert_eq!(session.get_num_neighbors(point, 1), 1);
            }
        }
        assert_eq!(session.get_num_neighbors(Point::new(1, 1), 1), 0);

        assert_eq!(
            session.step().unwrap(),
            StepOutcome::Advanced {
                generation: 1,
                writes: 1
            }
        );
        assert_eq!(session.get_grid().count_state(0), 9);
        assert_eq!(session.get_generation(), 1);
    }

    #[test]
    fn test_wraparound_resolution() {
        let session = session(500, 500);
        session.init_ca(conway()).unwrap();

        session.set_cell_state(Point::new(502, -5), 1);
        assert_eq!(session.update_grid(true).unwrap(), 1);
        assert_eq!(session.get_cell_state(Point::new(2, 495)), 1);
        assert_eq!(session.get_cell_state(Point::new(-498, 995)), 1);

        // The frame carries the resolved coordinate
        let frame = session.get_updated().unwrap();
        assert_eq!(frame.kind(), FrameKind::Edit);
        assert_eq!(frame.cells(), &[Cell::new(2, 495, 1)]);
    }

    #[test]
    fn test_frames_follow_step_order() {
        let session = session(16, 16);
        session.init_ca(conway()).unwrap();
        // R-pentomino keeps changing for a long time
        for (x, y) in [(7, 6), (8, 6), (6, 7), (7, 7), (7, 8)] {
            session.set_cell_state(Point::new(x, y), 1);
        }
        session.update_grid(false).unwrap();

        let mut replayed = session.get_grid();
        let mut expected = Vec::new();
        for _ in 0..12 {
            session.step().unwrap();
            expected.push(session.get_grid());
        }

        for (i, grid) in expected.iter().enumerate() {
            let frame = session.get_updated().unwrap();
            assert_eq!(frame.kind(), FrameKind::Step);
            assert_eq!(frame.generation(), i as u64 + 1);
            replay(&mut replayed, &frame);
            assert_eq!(&replayed, grid, "after frame {}", i + 1);
        }
        assert!(session.get_updated().is_none());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let session = session(32, 32);
        assert_eq!(session.stop(), StopStatus::AlreadyStopped);

        session.init_ca(conway()).unwrap();
        assert_eq!(session.run(false).unwrap(), RunStatus::Started);
        assert_eq!(session.state(), SchedulerState::Running);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(session.stop(), StopStatus::Stopped);
        let generation = session.get_generation();
        assert_eq!(session.stop(), StopStatus::AlreadyStopped);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(session.get_generation(), generation);
        assert_eq!(session.state(), SchedulerState::Configured);
    }

    #[test]
    fn test_rule_downgrade_blanks_grid() {
        let session = session(6, 6);
        let three_states = RuleSpec::new(3, 0, Vec::new(), RuleBody::Script(String::new()));
        session.init_ca(three_states).unwrap();
        session.set_cell_state(Point::new(1, 1), 2);
        session.set_cell_state(Point::new(4, 2), 1);
        session.step().unwrap();
        assert_eq!(session.get_generation(), 1);

        let two_states = RuleSpec::new(2, 1, Vec::new(), RuleBody::Script(String::new()));
        let report = session.init_ca(two_states).unwrap();
        assert!(report.downgraded());
        assert_eq!(session.get_grid().count_state(1), 36);
        assert_eq!(session.get_generation(), 0);
        assert!(session.get_updated().is_none());

        // Same state count: the grid is left alone
        session.set_cell_state(Point::new(0, 0), 0);
        session.update_grid(false).unwrap();
        session.init_ca(conway()).unwrap();
        assert_eq!(session.get_cell_state(Point::new(0, 0)), 0);
    }

    #[test]
    fn test_incremental_matches_full_sweep_through_sessions() {
        let incremental = session(20, 20);
        let full = Session::new(SimConfig {
            grid_width: 20,
            grid_height: 20,
            worker_threads: 2,
            incremental: false,
            ..SimConfig::default()
        })
        .unwrap();

        let mut rows = vec![vec![0u32; 20]; 20];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = ((i * 7 + j * 13) % 5 == 0) as u32;
            }
        }
        let start = GridSnapshot::from_rows(&rows).unwrap();
        for s in [&incremental, &full] {
            s.init_ca(conway()).unwrap();
            s.init_grid(start.clone()).unwrap();
        }

        for generation in 1..=25 {
            incremental.step().unwrap();
            full.step().unwrap();
            assert_eq!(incremental.get_grid(), full.get_grid(), "generation {generation}");
        }
    }

    #[test]
    fn test_c_abi_round_trip() {
        unsafe {
            let session = ta_session_create(8, 8, 2);
            assert!(!session.is_null());

            let rule = CString::new("B3/S23").unwrap();
            let mut err = [0 as c_char; 128];
            assert_eq!(
                ta_init_ca_life(session, rule.as_ptr(), ptr::null(), 0, err.as_mut_ptr(), err.len()),
                TA_OK
            );

            // Glider
            let mut start = vec![0u32; 64];
            for (x, y) in [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)] {
                start[y * 8 + x] = 1;
            }
            assert_eq!(ta_import_grid(session, start.as_ptr(), 8, 8), TA_OK);

            for _ in 0..4 {
                assert_eq!(ta_step(session), TA_OK);
            }
            assert_eq!(ta_get_generation(session), 4);

            // Replay the frames onto the starting grid
            let mut replayed = start.clone();
            let mut last_generation = 0;
            loop {
                let len = ta_next_frame_len(session);
                if len < 0 {
                    break;
                }
                let mut cells = vec![Cell::default(); len as usize];
                let mut generation = 0u64;
                let copied =
                    ta_get_updated(session, cells.as_mut_ptr(), cells.len(), &mut generation);
                assert_eq!(copied, len);
                assert_eq!(generation, last_generation + 1);
                last_generation = generation;
                for cell in cells {
                    replayed[cell.y as usize * 8 + cell.x as usize] = cell.state;
                }
            }
            assert_eq!(last_generation, 4);

            let mut exported = vec![0u32; 64];
            assert_eq!(ta_export_grid(session, exported.as_mut_ptr(), exported.len()), 64);
            assert_eq!(exported, replayed);

            // After four generations a glider has moved one cell down and right
            let mut moved = vec![0u32; 64];
            for (x, y) in [(2, 1), (3, 2), (1, 3), (2, 3), (3, 3)] {
                moved[y * 8 + x] = 1;
            }
            assert_eq!(exported, moved);

            ta_session_destroy(session);
        }
    }

    #[test]
    fn test_c_abi_script_rejection_keeps_previous_rule() {
        unsafe {
            let session = ta_session_create(4, 4, 1);
            let good = CString::new("if state == 0 { set(1) }").unwrap();
            let bad = CString::new("if state == { set(1) }").unwrap();
            let mut err = [0 as c_char; 256];

            assert_eq!(
                ta_init_ca_script(session, 2, 0, ptr::null(), 0, good.as_ptr(), err.as_mut_ptr(), err.len()),
                TA_OK
            );
            assert_eq!(
                ta_init_ca_script(session, 5, 0, ptr::null(), 0, bad.as_ptr(), err.as_mut_ptr(), err.len()),
                TA_REJECTED
            );
            assert_ne!(err[0], 0);
            assert_eq!(ta_get_num_states(session), 2);

            assert_eq!(ta_step(session), TA_OK);
            assert_eq!(ta_get_cell_state(session, 3, 3), 1);

            ta_session_destroy(session);
        }
    }
}
