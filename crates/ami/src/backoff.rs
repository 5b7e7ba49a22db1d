//! Exponentieller Backoff mit Obergrenze und Jitter
//!
//! Wartezeit verdoppelt sich je Fehlversuch bis `max`. Ein relativer
//! Zufallsanteil verhindert, dass viele Instanzen nach einem Neustart der
//! Anlage im Gleichschritt neu verbinden.

use rand::Rng;
use std::time::Duration;

/// Untergrenze jeder Basis-Wartezeit
pub const MIN_WARTEZEIT: Duration = Duration::from_millis(10);

/// Backoff-Zustand eines Supervisors
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    aktuell: Duration,
}

impl Backoff {
    /// Erstellt einen Backoff
    ///
    /// `jitter` wird auf 0.0 bis 1.0 begrenzt, NaN gilt als 0.0. Wartezeiten
    /// liegen nie unter `MIN_WARTEZEIT`.
    pub fn neu(initial: Duration, max: Duration, jitter: f64) -> Self {
        let max = max.max(MIN_WARTEZEIT);
        let initial = initial.clamp(MIN_WARTEZEIT, max);
        let jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
        Self {
            initial,
            max,
            jitter,
            aktuell: initial,
        }
    }

    /// Naechste Wartezeit; erhoeht den Basiswert fuer den folgenden Aufruf
    pub fn naechste(&mut self) -> Duration {
        let basis = self.aktuell;
        self.aktuell = (self.aktuell * 2).min(self.max);

        if self.jitter <= 0.0 || basis.is_zero() {
            return basis;
        }
        let faktor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        basis.mul_f64(faktor).min(self.max)
    }

    /// Nach einer erfolgreichen Sitzung wieder bei `initial` beginnen
    pub fn zuruecksetzen(&mut self) {
        self.aktuell = self.initial;
    }
}
