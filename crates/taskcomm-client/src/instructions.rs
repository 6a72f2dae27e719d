//! Instruction list state holder.

use std::sync::Arc;

use taskcomm_shared::{Instruction, InstructionId, NewInstruction, Task, UserId};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionsState {
    Idle,
    Loading,
    Ready,
    Error(String),
}

pub struct InstructionHolder {
    repo: Arc<Repository>,
    state: watch::Sender<InstructionsState>,
    list: watch::Sender<Vec<Instruction>>,
}

impl InstructionHolder {
    pub fn new(repo: Arc<Repository>) -> Self {
        let (state, _) = watch::channel(InstructionsState::Idle);
        let (list, _) = watch::channel(Vec::new());
        Self { repo, state, list }
    }

    pub fn instructions(&self) -> watch::Receiver<Vec<Instruction>> {
        self.list.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<InstructionsState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> InstructionsState {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> Vec<Instruction> {
        self.list.borrow().clone()
    }

    /// Load the user's instructions.  A failed load shows an empty list.
    pub async fn load_for_user(&self, user_id: &UserId) {
        self.state.send_replace(InstructionsState::Loading);
        let loaded = self.repo.instructions_for_user(user_id).await;
        debug!(user_id = %user_id, count = loaded.len(), "instructions loaded");
        self.publish(loaded);
    }

    pub async fn load_all(&self) {
        self.state.send_replace(InstructionsState::Loading);
        let loaded = self.repo.all_instructions().await;
        debug!(count = loaded.len(), "all instructions loaded");
        self.publish(loaded);
    }

    /// Create an instruction and reload the author's list.
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        user_id: &UserId,
    ) -> Result<Instruction> {
        self.state.send_replace(InstructionsState::Loading);
        let new = NewInstruction::new(user_id.clone(), title, description);
        match self.repo.create_instruction(&new).await {
            Ok(created) => {
                self.load_for_user(user_id).await;
                Ok(created)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn update(&self, instruction: &Instruction) -> Result<Instruction> {
        self.state.send_replace(InstructionsState::Loading);
        match self.repo.update_instruction(instruction).await {
            Ok(stored) => {
                self.list.send_modify(|list| {
                    if let Some(slot) = list.iter_mut().find(|i| i.id == stored.id) {
                        *slot = stored.clone();
                    }
                });
                self.state.send_replace(InstructionsState::Ready);
                Ok(stored)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Look an instruction up in the loaded list, then the repository.
    pub async fn find(&self, id: &InstructionId) -> Option<Instruction> {
        if let Some(found) = self.list.borrow().iter().find(|i| &i.id == id) {
            return Some(found.clone());
        }
        match self.repo.get_instruction(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(instruction_id = %id, error = %e, "instruction lookup failed");
                None
            }
        }
    }

    pub async fn tasks_for(&self, instruction_id: &InstructionId) -> Vec<Task> {
        self.repo.tasks_for_instruction(instruction_id).await
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, InstructionsState::Error(_)) {
                *state = InstructionsState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn publish(&self, loaded: Vec<Instruction>) {
        self.list.send_replace(loaded);
        self.state.send_replace(InstructionsState::Ready);
    }

    fn fail(&self, error: ClientError) -> ClientError {
        warn!(error = %error, "instruction operation failed");
        self.state
            .send_replace(InstructionsState::Error(error.to_string()));
        error
    }
}
