use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::{
    config::{Catalog, CatalogSection, ScrapeContext},
    errors::{ScrapeError, SessionError},
    pagination::collect_section,
    product::ProductRecord,
    session::{RenderSession, SessionFactory, with_session},
    sink::ProductSink,
};

/// A section that was collected and written.
#[derive(Debug)]
pub struct SectionOutput {
    pub records: Vec<ProductRecord>,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct SectionOutcome {
    pub name: String,
    pub result: Result<SectionOutput, ScrapeError>,
}

/// Per-section results, in configured section order.
#[derive(Debug, Default)]
pub struct CatalogReport {
    pub sections: Vec<SectionOutcome>,
}

impl CatalogReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScrapeError)> {
        self.sections.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|e| (outcome.name.as_str(), e))
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Collects and writes every section in turn on one session. A failing
/// section is recorded and the remaining sections still run.
pub async fn run<S, K>(
    session: &mut S,
    sections: &Catalog,
    ctx: &ScrapeContext,
    sink: &K,
) -> CatalogReport
where
    S: RenderSession,
    K: ProductSink,
{
    let mut report = CatalogReport::default();
    for section in sections.iter() {
        let result = run_section(session, section, ctx, sink).await;
        match &result {
            Ok(output) => info!(
                "Section {} done: {} products in {}",
                section.name,
                output.records.len(),
                output.path.display()
            ),
            Err(e) => error!("Section {} failed: {}", section.name, e),
        }
        report.sections.push(SectionOutcome {
            name: section.name.clone(),
            result,
        });
    }
    report
}

async fn run_section<S, K>(
    session: &mut S,
    section: &CatalogSection,
    ctx: &ScrapeContext,
    sink: &K,
) -> Result<SectionOutput, ScrapeError>
where
    S: RenderSession,
    K: ProductSink,
{
    info!("Scraping section {} from {}", section.name, section.url);
    let records = collect_section(session, &section.url, ctx).await?;
    let path = sink.write_section(&section.name, &records)?;
    Ok(SectionOutput { records, path })
}

/// Splits the sections round-robin over `workers` independent sessions and
/// runs the partitions concurrently. Sessions are never shared; the sink is.
pub async fn run_partitioned<F, K>(
    factory: &F,
    sections: &Catalog,
    ctx: &ScrapeContext,
    sink: &K,
    workers: usize,
) -> CatalogReport
where
    F: SessionFactory,
    K: ProductSink,
{
    let mut workers = workers.clamp(1, sections.len().max(1));
    if let Some(limit) = factory.max_sessions() {
        if workers > limit {
            warn!(
                "Driver serves at most {} session(s), running {} worker(s) instead of {}",
                limit, limit, workers
            );
            workers = limit.max(1);
        }
    }
    let mut partitions = vec![Catalog::default(); workers];
    for (index, section) in sections.iter().enumerate() {
        partitions[index % workers].push(section.clone());
    }

    let runs = partitions.iter().enumerate().map(|(worker, partition)| async move {
        info!("Worker {} takes {} sections", worker, partition.len());
        match with_session(factory, async |session| {
            run(session, partition, ctx, sink).await
        })
        .await
        {
            Ok(report) => report.sections,
            Err(e) => {
                error!("Worker {} could not open a session: {}", worker, e);
                partition
                    .iter()
                    .map(|section| SectionOutcome {
                        name: section.name.clone(),
                        result: Err(SessionError::Other(format!("no session: {e}")).into()),
                    })
                    .collect()
            }
        }
    });

    let mut outcomes: Vec<SectionOutcome> = futures::future::join_all(runs)
        .await
        .into_iter()
        .flatten()
        .collect();
    outcomes.sort_by_key(|outcome| sections.iter().position(|s| s.name == outcome.name));
    CatalogReport { sections: outcomes }
}
