//! Rapport de migration
//!
//! Collecte les compteurs par table cible et la liste structurée des features
//! écartées, affichée en fin d'exécution et sauvegardable en JSON.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

/// Statut global de l'exécution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Toutes les features ont été migrées
    Success,
    /// Migration terminée avec des features écartées
    PartialSuccess,
    /// Migration interrompue par une erreur fatale, ou aucune feature migrée
    Failed,
    /// Migration interrompue par l'utilisateur
    Cancelled,
}

/// Niveau de sévérité des échecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: migration arrêtée
    Fatal,
    /// Erreur: feature écartée
    Error,
}

/// Nature de l'échec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    MalformedGeometry,
    ClassificationGap,
    PersistenceFailure,
}

/// Feature écartée avec son contexte
#[derive(Debug, Clone, Serialize)]
pub struct FeatureFailure {
    pub level: ErrorLevel,
    pub kind: FailureKind,
    pub feature_id: i64,
    pub project_component_id: i64,
    pub component_name: String,
    /// Table cible, quand la classification a abouti
    pub target_table: Option<String>,
    pub message: String,
    /// Requête fautive, géométrie WKT...
    pub details: Option<String>,
}

/// Statistiques par table cible
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStats {
    /// Features écrites
    pub migrated: usize,
    /// Features routées sans écriture (dry-run)
    pub planned: usize,
    /// Corrections de couche appliquées (ou prévues)
    pub overrides: usize,
    /// Échecs d'écriture
    pub failed: usize,
}

/// Rapport complet d'une exécution
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Exécution à blanc
    pub dry_run: bool,
    /// Durée de la migration
    pub duration_secs: f64,
    /// Statut global
    pub status: RunStatus,

    /// Nombre de lignes source lues
    pub features_read: usize,
    /// Nombre de features migrées (ou routées en dry-run)
    pub features_migrated: usize,
    /// Nombre de features écartées
    pub features_skipped: usize,

    /// Statistiques par table cible
    pub by_table: HashMap<String, TableStats>,

    /// Liste des échecs
    pub failures: Vec<FeatureFailure>,

    /// Arrêt demandé par l'utilisateur
    pub cancelled: bool,
}

impl Default for MigrationReport {
    fn default() -> Self {
        Self {
            dry_run: false,
            duration_secs: 0.0,
            status: RunStatus::Success,
            features_read: 0,
            features_migrated: 0,
            features_skipped: 0,
            by_table: HashMap::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }
}

impl MigrationReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Enregistre une ligne source lue
    pub fn record_read(&mut self) {
        self.features_read += 1;
    }

    /// Enregistre une feature écrite dans sa table cible
    pub fn record_migrated(&mut self, table: &str, override_applied: bool) {
        self.features_migrated += 1;
        let stats = self.by_table.entry(table.to_string()).or_default();
        stats.migrated += 1;
        if override_applied {
            stats.overrides += 1;
        }
    }

    /// Enregistre le routage prévu d'une feature (dry-run)
    pub fn record_planned(&mut self, table: &str, with_override: bool) {
        self.features_migrated += 1;
        let stats = self.by_table.entry(table.to_string()).or_default();
        stats.planned += 1;
        if with_override {
            stats.overrides += 1;
        }
    }

    /// Enregistre une feature écartée
    pub fn record_failure(&mut self, failure: FeatureFailure) {
        self.features_skipped += 1;
        if let Some(ref table) = failure.target_table {
            self.by_table.entry(table.clone()).or_default().failed += 1;
        }
        self.failures.push(failure);
    }

    /// Marque l'exécution comme interrompue par l'utilisateur
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Vrai si une erreur fatale a arrêté la migration
    pub fn is_aborted(&self) -> bool {
        self.failures.iter().any(|f| f.level == ErrorLevel::Fatal)
    }

    /// Nombre de corrections de couche
    pub fn overrides(&self) -> usize {
        self.by_table.values().map(|s| s.overrides).sum()
    }

    /// Définit la durée de la migration
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_errors = !self.failures.is_empty();
        let has_success = self.features_migrated > 0;

        self.status = if self.is_aborted() {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else if has_errors && has_success {
            RunStatus::PartialSuccess
        } else if has_errors {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        if self.dry_run {
            println!("MIGRATION REPORT (dry run)");
        } else {
            println!("MIGRATION REPORT");
        }
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Features: {} read, {} {}, {} skipped, {} overrides",
            self.features_read,
            self.features_migrated,
            if self.dry_run { "planned" } else { "migrated" },
            self.features_skipped,
            self.overrides()
        );

        if !self.by_table.is_empty() {
            println!("\n--- BY TABLE ---");
            let mut tables: Vec<_> = self.by_table.iter().collect();
            tables.sort_by_key(|(k, _)| k.as_str());
            for (table, stats) in tables {
                if self.dry_run {
                    println!(
                        "  {}: {} planned, {} overrides",
                        table, stats.planned, stats.overrides
                    );
                } else {
                    println!(
                        "  {}: {} migrated, {} overrides, {} failed",
                        table, stats.migrated, stats.overrides, stats.failed
                    );
                }
            }
        }

        if !self.failures.is_empty() {
            println!("\n--- FAILURES ({}) ---", self.failures.len());
            for f in self.failures.iter().take(20) {
                println!(
                    "  {:?} [feature {} / component {}] {:?}: {}",
                    f.level, f.feature_id, f.project_component_id, f.kind, f.message
                );
            }
            if self.failures.len() > 20 {
                println!("  ... and {} more", self.failures.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} read, {} migrated, {} skipped",
            self.status, self.features_read, self.features_migrated, self.features_skipped
        )
    }
}
