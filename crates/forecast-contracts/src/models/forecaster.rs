use std::sync::{Arc, Mutex};

use crate::error::{ScoringError, ScoringResult};
use crate::table::Table;

/// A loaded forecasting model.
///
/// Implementations must be safe for concurrent reads: the online path shares a
/// single handle across requests without locking. Models that need exclusive
/// access to predict belong behind [`SerialForecaster`].
pub trait Forecaster: Send + Sync {
    fn kind(&self) -> &str;
    fn predict(&self, table: &Table) -> ScoringResult<Vec<f64>>;
}

/// Shared, read-only model handle.
pub type ModelHandle = Arc<dyn Forecaster>;

/// A model whose prediction mutates internal state (scratch buffers, caches).
pub trait ForecasterMut: Send {
    fn kind(&self) -> &str;
    fn predict_mut(&mut self, table: &Table) -> ScoringResult<Vec<f64>>;
}

/// Serializes every prediction through a mutex so a [`ForecasterMut`] can be
/// shared like any other handle.
pub struct SerialForecaster<M> {
    kind: String,
    inner: Mutex<M>,
}

impl<M: ForecasterMut> SerialForecaster<M> {
    pub fn new(model: M) -> Self {
        Self {
            kind: model.kind().to_string(),
            inner: Mutex::new(model),
        }
    }
}

impl<M: ForecasterMut> Forecaster for SerialForecaster<M> {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn predict(&self, table: &Table) -> ScoringResult<Vec<f64>> {
        let mut model = self
            .inner
            .lock()
            .map_err(|_| ScoringError::schema(format!("{} model lock poisoned", self.kind)))?;
        model.predict_mut(table)
    }
}

/// Runs the model and checks that it produced one forecast per row.
pub fn predict(model: &dyn Forecaster, table: &Table) -> ScoringResult<Vec<f64>> {
    let forecasts = model.predict(table)?;
    if forecasts.len() != table.row_count() {
        return Err(ScoringError::schema(format!(
            "{} model returned {} forecasts for {} rows",
            model.kind(),
            forecasts.len(),
            table.row_count()
        )));
    }
    Ok(forecasts)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use super::{predict, Forecaster, ForecasterMut, ModelHandle, SerialForecaster};
    use crate::error::{ScoringError, ScoringResult};
    use crate::table::Table;

    struct Fixed(Vec<f64>);

    impl Forecaster for Fixed {
        fn kind(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _table: &Table) -> ScoringResult<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    struct Counting {
        calls: usize,
    }

    impl ForecasterMut for Counting {
        fn kind(&self) -> &str {
            "counting"
        }

        fn predict_mut(&mut self, table: &Table) -> ScoringResult<Vec<f64>> {
            self.calls += 1;
            Ok(vec![self.calls as f64; table.row_count()])
        }
    }

    fn rows(n: usize) -> anyhow::Result<Table> {
        let values = (0..n).map(|idx| json!(idx)).collect::<Vec<_>>();
        Ok(Table::from_payload(&json!({ "feature1": values }))?)
    }

    #[test]
    fn predict_preserves_row_order() -> anyhow::Result<()> {
        let model = Fixed(vec![1.0, 2.0, 3.0]);
        assert_eq!(predict(&model, &rows(3)?)?, vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn predict_rejects_misaligned_output() -> anyhow::Result<()> {
        let model = Fixed(vec![1.0, 2.0]);
        let err = predict(&model, &rows(3)?).err();
        assert!(matches!(err, Some(ScoringError::Schema(_))));
        Ok(())
    }

    #[test]
    fn serial_forecaster_is_shareable_across_threads() -> anyhow::Result<()> {
        let handle: ModelHandle = Arc::new(SerialForecaster::new(Counting { calls: 0 }));
        let table = rows(2)?;

        let workers = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                let table = table.clone();
                thread::spawn(move || predict(handle.as_ref(), &table).map(|out| out.len()))
            })
            .collect::<Vec<_>>();
        for worker in workers {
            let produced = worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))??;
            assert_eq!(produced, 2);
        }

        let last = predict(handle.as_ref(), &table)?;
        assert_eq!(last, vec![5.0, 5.0]);
        assert_eq!(handle.kind(), "counting");
        Ok(())
    }
}
