use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs, thread};
use velomap_index::{PageTreeResult, Point, Way};

/// Runs a test between a setup and a teardown step.
/// The teardown runs even when the test fails or panics.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> PageTreeResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> PageTreeResult<TestContext>,
    A: Fn(TestContext) -> PageTreeResult<()>,
{
    let start_time = Instant::now();
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_ctx = ctx.clone();
    let result = std::panic::catch_unwind(move || test(test_ctx));
    let after_result = after(ctx);
    let elapsed = start_time.elapsed();

    match result {
        Ok(Ok(())) => {
            if let Err(e) = after_result {
                panic!("After run failed: {:?}", e);
            }
        }
        Ok(Err(e)) => {
            eprintln!("\n==================== TEST FAILED ====================");
            eprintln!("Failed after {:?}", elapsed);
            panic!("Test failed: {:?}", e);
        }
        Err(panic_err) => {
            eprintln!("\n==================== TEST PANICKED ====================");
            eprintln!("Panicked after {:?}", elapsed);
            std::panic::resume_unwind(panic_err);
        }
    }
}

#[derive(Clone)]
pub struct TestContext {
    dir: PathBuf,
}

impl TestContext {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an index file inside this test's directory.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.vmi", name))
    }
}

pub fn random_path() -> PathBuf {
    env::temp_dir().join(format!("velomap_{}", uuid::Uuid::new_v4()))
}

pub fn create_test_context() -> PageTreeResult<TestContext> {
    let dir = random_path();
    if dir.exists() {
        let _ = fs::remove_dir_all(&dir);
    }
    fs::create_dir_all(&dir)?;
    Ok(TestContext::new(dir))
}

pub fn cleanup(ctx: TestContext) -> PageTreeResult<()> {
    let max_retries = 5;
    for retry in 0..max_retries {
        if !ctx.dir().exists() {
            return Ok(());
        }
        match fs::remove_dir_all(ctx.dir()) {
            Ok(_) => return Ok(()),
            Err(e) if retry < max_retries - 1 => {
                log::warn!("Retrying removal of {:?}: {}", ctx.dir(), e);
                thread::sleep(Duration::from_millis(50 * (retry as u64 + 1)));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Seeded generator so failures reproduce.
pub fn test_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A point inside a square of `extent` around the origin.
pub fn random_point(rng: &mut StdRng, extent: i32) -> Point {
    Point::new(rng.gen_range(-extent..=extent), rng.gen_range(-extent..=extent))
}

/// A short polyline with a generated street name.
pub fn random_way(rng: &mut StdRng, extent: i32) -> Way {
    let start = random_point(rng, extent);
    let points = (0..rng.gen_range(1..12))
        .map(|_| {
            Point::new(
                start.x.saturating_add(rng.gen_range(-500..=500)),
                start.y.saturating_add(rng.gen_range(-500..=500)),
            )
        })
        .collect();
    let name = format!("Street {}", rng.gen_range(1..10_000));
    Way::new(points, name, rng.gen())
}
