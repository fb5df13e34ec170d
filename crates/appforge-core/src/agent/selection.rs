use crate::agent::persona::Persona;
use crate::transcript::Transcript;

/// Decides who speaks next. Must be deterministic for a given transcript.
pub trait SelectionStrategy: Send + Sync {
    fn next(&self, transcript: &Transcript) -> Persona;
}

impl<F> SelectionStrategy for F
where
    F: Fn(&Transcript) -> Persona + Send + Sync,
{
    fn next(&self, transcript: &Transcript) -> Persona {
        self(transcript)
    }
}

/// BusinessAnalyst → SoftwareEngineer → ProductOwner → BusinessAnalyst …,
/// continuing after whichever persona spoke last.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl SelectionStrategy for RoundRobin {
    fn next(&self, transcript: &Transcript) -> Persona {
        let last = transcript
            .entries()
            .rev()
            .filter(|e| !e.is_user())
            .find_map(|e| e.author_name.as_deref().and_then(Persona::from_name));

        match last {
            None => Persona::ALL[0],
            Some(persona) => {
                let position = Persona::ALL.iter().position(|p| *p == persona).unwrap_or(0);
                Persona::ALL[(position + 1) % Persona::ALL.len()]
            }
        }
    }
}
