//! DQN Training Loop
//!
//! Deep Q-learning with experience replay and a periodically synchronised
//! target estimator. The online estimator is trained on the autodiff backend;
//! the target is kept as the online module's inner (non-autodiff) module, so
//! bootstrap values never carry gradients.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::stop::StopSignal;
use crate::core::{Transition, TransitionBatch};
use crate::environment::{Environment, StepResult};
use crate::error::{Result, TraderError};
use crate::estimator::{rows_to_tensor, tensor_to_vec, ActionValueEstimator, EstimatorView};
use crate::memory::ReplayMemory;
use crate::policy::{EpsilonGreedyPolicy, PolicyConfig};

/// DQN trainer hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnTrainerParameters {
    /// Transitions per optimisation step
    pub batch_size: usize,
    /// Discount factor
    pub gamma: f64,
    /// Replay memory capacity
    pub memory_size: usize,
    /// Synchronise the target every this many episodes
    pub target_update: usize,
    /// Optimizer learning rate
    pub learning_rate: f64,
    /// Gradients are clamped to `[-grad_clip, grad_clip]`
    pub grad_clip: f32,
    /// Huber loss threshold
    pub huber_delta: f32,
}

impl Default for DqnTrainerParameters {
    fn default() -> Self {
        Self {
            batch_size: 32,
            gamma: 0.999,
            memory_size: 10_000,
            target_update: 10,
            learning_rate: 1e-4,
            grad_clip: 1.0,
            huber_delta: 1.0,
        }
    }
}

impl DqnTrainerParameters {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.batch_size == 0 {
            errors.push("batch_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            errors.push("gamma must be in [0, 1]".to_string());
        }
        if self.memory_size == 0 {
            errors.push("memory_size must be positive".to_string());
        }
        if self.target_update == 0 {
            errors.push("target_update must be positive".to_string());
        }
        if !(self.learning_rate > 0.0) {
            errors.push("learning_rate must be positive".to_string());
        }
        if !(self.grad_clip > 0.0) {
            errors.push("grad_clip must be positive".to_string());
        }
        if !(self.huber_delta > 0.0) {
            errors.push("huber_delta must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Outcome of one completed episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeReport {
    /// Global episode index, counted across `train` calls
    pub episode: usize,
    pub steps: usize,
    pub total_reward: f32,
    /// Mean loss over the episode's optimisation steps, if any ran
    pub mean_loss: Option<f32>,
    /// Exploration rate used during the episode
    pub epsilon: f64,
}

/// Result of a `train` call
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingSummary {
    /// Episodes completed in this call
    pub episodes: usize,
    pub total_steps: usize,
    pub optimization_steps: usize,
    pub target_syncs: usize,
    /// Whether a stop request ended the call before `num_episodes`
    pub stopped_early: bool,
    pub reports: Vec<EpisodeReport>,
}

impl TrainingSummary {
    /// Average total reward per episode
    pub fn average_reward(&self) -> f32 {
        if self.reports.is_empty() {
            return 0.0;
        }
        self.reports.iter().map(|r| r.total_reward).sum::<f32>() / self.reports.len() as f32
    }
}

/// DQN trainer
///
/// Owns the online and target estimators, the replay memory, the policy and
/// the environment for the duration of training. `R` drives exploration and
/// `S` drives replay sampling.
pub struct DqnTrainer<B, M, O, E, R = StdRng, S = StdRng>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    online: M,
    target: M::InnerModule,
    optimizer: O,
    environment: E,
    policy: EpsilonGreedyPolicy<R>,
    memory: ReplayMemory<S>,
    params: DqnTrainerParameters,
    device: B::Device,
    stop: StopSignal,
    /// Completed episodes across all `train` calls
    episodes_done: usize,
    optimization_steps: usize,
    target_syncs: usize,
}

impl<B, M, O, E> DqnTrainer<B, M, O, E, StdRng, StdRng>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ActionValueEstimator<B>,
    M::InnerModule: ActionValueEstimator<B::InnerBackend>,
    O: Optimizer<M, B>,
    E: Environment,
{
    /// Create a trainer with seeded (or entropy-seeded) randomness
    pub fn new(
        online: M,
        optimizer: O,
        environment: E,
        params: DqnTrainerParameters,
        policy: PolicyConfig,
        seed: Option<u64>,
        device: B::Device,
    ) -> Result<Self> {
        let mut seeder = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let policy = EpsilonGreedyPolicy::new(policy, StdRng::seed_from_u64(seeder.gen()))?;
        let memory = ReplayMemory::with_seed(params.memory_size, seeder.gen())?;

        Self::with_components(online, optimizer, environment, params, policy, memory, device)
    }
}

impl<B, M, O, E, R, S> DqnTrainer<B, M, O, E, R, S>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ActionValueEstimator<B>,
    M::InnerModule: ActionValueEstimator<B::InnerBackend>,
    O: Optimizer<M, B>,
    E: Environment,
    R: Rng,
    S: Rng,
{
    /// Create a trainer from an already built policy and replay memory
    pub fn with_components(
        online: M,
        optimizer: O,
        environment: E,
        params: DqnTrainerParameters,
        policy: EpsilonGreedyPolicy<R>,
        memory: ReplayMemory<S>,
        device: B::Device,
    ) -> Result<Self> {
        params
            .validate()
            .map_err(|errors| TraderError::InvalidConfig(errors.join("; ")))?;

        let target = online.valid();

        Ok(Self {
            online,
            target,
            optimizer,
            environment,
            policy,
            memory,
            params,
            device,
            stop: StopSignal::new(),
            episodes_done: 0,
            optimization_steps: 0,
            target_syncs: 0,
        })
    }

    /// Use an externally owned stop flag
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Run `num_episodes` episodes
    ///
    /// A stop request is honoured between episodes only. Any error from the
    /// environment or policy aborts training and is returned as-is.
    pub fn train(&mut self, num_episodes: usize) -> Result<TrainingSummary> {
        if self.params.batch_size > self.params.memory_size {
            warn!(
                batch_size = self.params.batch_size,
                memory_size = self.params.memory_size,
                "batch size exceeds memory size, no optimisation step will ever run"
            );
        }

        let mut summary = TrainingSummary::default();
        let optimization_steps_before = self.optimization_steps;
        let target_syncs_before = self.target_syncs;

        for _ in 0..num_episodes {
            if self.stop.should_stop() {
                warn!(
                    completed = summary.episodes,
                    requested = num_episodes,
                    "stop requested, ending training early"
                );
                summary.stopped_early = true;
                break;
            }

            let report = self.run_episode()?;
            info!(
                episode = report.episode,
                steps = report.steps,
                total_reward = report.total_reward,
                mean_loss = ?report.mean_loss,
                epsilon = report.epsilon,
                memory_fill = self.memory.fill_ratio(),
                "episode complete"
            );

            summary.episodes += 1;
            summary.total_steps += report.steps;
            summary.reports.push(report);
        }

        summary.optimization_steps = self.optimization_steps - optimization_steps_before;
        summary.target_syncs = self.target_syncs - target_syncs_before;
        Ok(summary)
    }

    fn run_episode(&mut self) -> Result<EpisodeReport> {
        let episode = self.episodes_done;
        let epsilon = self.policy.epsilon();

        let mut state = self.environment.reset()?;
        let mut steps = 0;
        let mut total_reward = 0.0f32;
        let mut loss_sum = 0.0f32;
        let mut loss_count = 0usize;

        loop {
            let valid_moves = self.environment.valid_moves();
            let action = {
                let model = self.online.valid();
                let view = EstimatorView::<B::InnerBackend, _>::new(&model, &self.device);
                self.policy.decide(&view, &state, &valid_moves)?
            };

            let StepResult {
                observation,
                reward,
                done,
                ..
            } = self.environment.step(action)?;
            steps += 1;
            total_reward += reward;

            let next_state = if done { None } else { Some(observation.clone()) };
            self.memory
                .push(Transition::new(state, action, next_state, reward));
            state = observation;

            if let Some(loss) = self.optimize_model()? {
                loss_sum += loss;
                loss_count += 1;
            }

            if done {
                break;
            }
        }

        self.policy.next_episode();
        if episode % self.params.target_update == 0 {
            self.sync_target();
        }
        self.episodes_done += 1;

        Ok(EpisodeReport {
            episode,
            steps,
            total_reward,
            mean_loss: (loss_count > 0).then(|| loss_sum / loss_count as f32),
            epsilon,
        })
    }

    /// One optimisation step on a sampled batch
    ///
    /// Returns `Ok(None)` without touching anything while the memory holds
    /// fewer than `batch_size` transitions.
    pub fn optimize_model(&mut self) -> Result<Option<f32>> {
        if !self.memory.has_enough_samples(self.params.batch_size) {
            return Ok(None);
        }

        let transitions = self.memory.sample(self.params.batch_size)?;
        self.optimize_batch(&transitions).map(Some)
    }

    /// One optimisation step on an explicit batch
    ///
    /// Returns the Huber loss measured before the parameter update.
    pub fn optimize_batch(&mut self, transitions: &[Transition]) -> Result<f32> {
        let batch = TransitionBatch::from_transitions(transitions)?;
        let n = batch.len();

        // Q(s, a) for the taken actions, tracked by autodiff
        let states = rows_to_tensor::<B>(batch.states.clone(), n, batch.state_dim, &self.device);
        let actions = Tensor::<B, 2, Int>::from_data(
            TensorData::new(batch.actions.clone(), [n, 1]).convert::<B::IntElem>(),
            &self.device,
        );
        let state_action_values = self.online.forward(states).gather(1, actions).squeeze::<1>(1);

        // max_a Q_target(s', a), zero for terminal transitions
        let next_state_values = self.bootstrap_values(&batch)?;
        let gamma = self.params.gamma as f32;
        let expected: Vec<f32> = next_state_values
            .iter()
            .zip(&batch.rewards)
            .map(|(value, reward)| value * gamma + reward)
            .collect();
        let expected = Tensor::<B, 1>::from_data(
            TensorData::new(expected, [n]).convert::<B::FloatElem>(),
            &self.device,
        );

        let loss = huber_loss(state_action_values, expected, self.params.huber_delta);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let mut grads = GradientsParams::from_grads(loss.backward(), &self.online);
        clamp_gradients::<B, M>(&self.online, &mut grads, self.params.grad_clip);
        self.online = self
            .optimizer
            .step(self.params.learning_rate, self.online.clone(), grads);
        self.optimization_steps += 1;

        debug!(loss = loss_value, batch = n, "optimisation step");
        Ok(loss_value)
    }

    fn bootstrap_values(&self, batch: &TransitionBatch) -> Result<Vec<f32>> {
        let mut values = vec![0.0f32; batch.len()];
        if batch.non_final_len() == 0 {
            return Ok(values);
        }

        let next_states = rows_to_tensor::<B::InnerBackend>(
            batch.non_final_next_states.clone(),
            batch.non_final_len(),
            batch.state_dim,
            &self.device,
        );
        let max_next = tensor_to_vec(self.target.forward(next_states).max_dim(1))?;
        for (&index, value) in batch.non_final_indices.iter().zip(max_next) {
            values[index] = value;
        }
        Ok(values)
    }

    /// Copy the online parameters into the target estimator
    pub fn sync_target(&mut self) {
        let snapshot = self.online.valid().into_record();
        self.target = self.target.clone().load_record(snapshot);
        self.target_syncs += 1;
        info!(
            episodes_done = self.episodes_done,
            syncs = self.target_syncs,
            "target estimator synchronised"
        );
    }

    pub fn online(&self) -> &M {
        &self.online
    }

    pub fn target(&self) -> &M::InnerModule {
        &self.target
    }

    pub fn memory(&self) -> &ReplayMemory<S> {
        &self.memory
    }

    pub fn policy(&self) -> &EpsilonGreedyPolicy<R> {
        &self.policy
    }

    pub fn params(&self) -> &DqnTrainerParameters {
        &self.params
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Completed episodes across all `train` calls
    pub fn episodes_done(&self) -> usize {
        self.episodes_done
    }

    /// A handle that can stop a running `train` call
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Give back the trained online estimator
    pub fn into_online(self) -> M {
        self.online
    }
}

/// Mean Huber (smooth L1) loss between two vectors
///
/// Quadratic for `|x| <= delta`, linear beyond.
pub fn huber_loss<B: Backend>(
    predicted: Tensor<B, 1>,
    expected: Tensor<B, 1>,
    delta: f32,
) -> Tensor<B, 1> {
    let abs_error = (predicted - expected).abs();
    let quadratic = abs_error.clone().clamp_max(delta);
    let linear = abs_error - quadratic.clone();

    (quadratic.clone() * quadratic * 0.5 + linear * delta).mean()
}

/// Clamp every parameter gradient of `module` to `[-bound, bound]`
///
/// The optimizer is supplied by the caller, so the clamp is applied here rather
/// than through the optimizer's own gradient clipping.
pub fn clamp_gradients<B, M>(module: &M, grads: &mut GradientsParams, bound: f32)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradientClamp::<B> {
        grads,
        bound,
        backend: PhantomData,
    };
    module.visit(&mut visitor);
}

struct GradientClamp<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    bound: f32,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientClamp<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: &ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id.clone(), grad.clamp(-self.bound, self.bound));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TradingAction;
    use burn::backend::Autodiff;
    use burn::nn::{Initializer, Linear, LinearConfig};
    use burn::optim::{AdamConfig, SgdConfig};
    use burn_ndarray::NdArray;
    use mockall::mock;
    use rand::rngs::mock::StepRng;

    type TestBackend = Autodiff<NdArray<f32>>;
    type InnerBackend = NdArray<f32>;

    /// Bias-free linear estimator with every weight set to `0.5`
    #[derive(Module, Debug)]
    struct LinearQ<B: Backend> {
        linear: Linear<B>,
    }

    impl<B: Backend> ActionValueEstimator<B> for LinearQ<B> {
        fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
            self.linear.forward(states)
        }
    }

    fn linear_q(device: &<TestBackend as Backend>::Device) -> LinearQ<TestBackend> {
        LinearQ {
            linear: LinearConfig::new(2, 3)
                .with_bias(false)
                .with_initializer(Initializer::Constant { value: 0.5 })
                .init(device),
        }
    }

    /// Fixed-length episodes where every action is legal
    struct CountdownEnv {
        length: usize,
        t: usize,
    }

    impl CountdownEnv {
        fn new(length: usize) -> Self {
            Self { length, t: 0 }
        }

        fn observation(&self) -> Vec<f32> {
            vec![self.t as f32 / self.length as f32, 1.0]
        }
    }

    impl Environment for CountdownEnv {
        type Info = ();

        fn reset(&mut self) -> Result<Vec<f32>> {
            self.t = 0;
            Ok(self.observation())
        }

        fn step(&mut self, _action: TradingAction) -> Result<StepResult<()>> {
            self.t += 1;
            Ok(StepResult {
                observation: self.observation(),
                reward: 1.0,
                done: self.t >= self.length,
                info: (),
            })
        }

        fn valid_moves(&self) -> Vec<TradingAction> {
            TradingAction::all().to_vec()
        }
    }

    mock! {
        Env {}

        impl Environment for Env {
            type Info = ();

            fn reset(&mut self) -> Result<Vec<f32>>;
            fn step(&mut self, action: TradingAction) -> Result<StepResult<()>>;
            fn valid_moves(&self) -> Vec<TradingAction>;
        }
    }

    fn params(batch_size: usize, target_update: usize, learning_rate: f64) -> DqnTrainerParameters {
        DqnTrainerParameters {
            batch_size,
            gamma: 0.9,
            memory_size: 100,
            target_update,
            learning_rate,
            ..DqnTrainerParameters::default()
        }
    }

    fn trainer<E: Environment>(
        environment: E,
        params: DqnTrainerParameters,
    ) -> DqnTrainer<
        TestBackend,
        LinearQ<TestBackend>,
        impl Optimizer<LinearQ<TestBackend>, TestBackend>,
        E,
    > {
        let device = Default::default();
        let online = linear_q(&device);
        let optimizer = SgdConfig::new().init::<TestBackend, LinearQ<TestBackend>>();
        DqnTrainer::new(
            online,
            optimizer,
            environment,
            params,
            PolicyConfig::default(),
            Some(42),
            device,
        )
        .unwrap()
    }

    fn outputs<M: ActionValueEstimator<InnerBackend>>(model: &M) -> Vec<f32> {
        let device = Default::default();
        let probe =
            Tensor::<InnerBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0], [0.3, 0.7]], &device);
        tensor_to_vec(model.forward(probe)).unwrap()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6, "{a:?} != {b:?}");
        }
    }

    fn differs(a: &[f32], b: &[f32]) -> bool {
        a.iter().zip(b).any(|(x, y)| (x - y).abs() > 1e-6)
    }

    #[test]
    fn test_huber_loss_regions() {
        let device = Default::default();
        let predicted = Tensor::<InnerBackend, 1>::from_floats([0.0, 0.0, 0.0], &device);
        let expected = Tensor::<InnerBackend, 1>::from_floats([0.5, -2.0, 3.0], &device);
        let loss = huber_loss(predicted, expected, 1.0).into_scalar();

        // 0.125 quadratic, 1.5 and 2.5 linear
        assert!((loss - (0.125 + 1.5 + 2.5) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let bad = DqnTrainerParameters {
            batch_size: 0,
            gamma: 1.5,
            target_update: 0,
            ..DqnTrainerParameters::default()
        };
        assert_eq!(bad.validate().unwrap_err().len(), 3);
        assert!(DqnTrainerParameters::default().validate().is_ok());
    }

    fn adam_trainer(
        params: DqnTrainerParameters,
    ) -> DqnTrainer<
        TestBackend,
        LinearQ<TestBackend>,
        impl Optimizer<LinearQ<TestBackend>, TestBackend>,
        CountdownEnv,
    > {
        let device = Default::default();
        let optimizer = AdamConfig::new().init::<TestBackend, LinearQ<TestBackend>>();
        DqnTrainer::new(
            linear_q(&device),
            optimizer,
            CountdownEnv::new(3),
            params,
            PolicyConfig::default(),
            Some(42),
            device,
        )
        .unwrap()
    }

    fn sample_transitions() -> [Transition; 2] {
        [
            Transition::new(vec![1.0, 0.0], TradingAction::Buy, Some(vec![0.0, 1.0]), 1.0),
            Transition::new(vec![0.0, 1.0], TradingAction::Sell, None, 5.0),
        ]
    }

    #[test]
    fn test_optimize_model_waits_for_enough_samples() {
        let mut trainer = trainer(CountdownEnv::new(3), params(4, 1, 0.1));
        let before = outputs(&trainer.online().valid());

        assert_eq!(trainer.optimize_model().unwrap(), None);
        assert!(trainer.memory().is_empty());
        assert_close(&outputs(&trainer.online().valid()), &before);
    }

    #[test]
    fn test_skipped_optimization_leaves_all_state_untouched() {
        let mut skipped = adam_trainer(params(4, 1, 0.1));
        let mut fresh = adam_trainer(params(4, 1, 0.1));
        let [first, second] = sample_transitions();
        skipped.memory.push(first);
        skipped.memory.push(second);

        let online_before = outputs(&skipped.online().valid());
        let target_before = outputs(skipped.target());
        assert_eq!(skipped.optimize_model().unwrap(), None);

        assert_eq!(skipped.memory().len(), 2);
        assert_eq!(skipped.optimization_steps, 0);
        assert_close(&outputs(&skipped.online().valid()), &online_before);
        assert_close(&outputs(skipped.target()), &target_before);

        // Adam moments are stateful, so matching a fresh optimizer over two
        // updates means the skipped call never stepped it
        for _ in 0..2 {
            let a = skipped.optimize_batch(&sample_transitions()).unwrap();
            let b = fresh.optimize_batch(&sample_transitions()).unwrap();
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
            assert_close(
                &outputs(&skipped.online().valid()),
                &outputs(&fresh.online().valid()),
            );
        }
        assert!(differs(&outputs(&skipped.online().valid()), &online_before));
    }

    #[test]
    fn test_optimize_batch_hand_computed_loss() {
        let mut trainer = trainer(CountdownEnv::new(3), params(2, 1, 0.01));
        let transitions = sample_transitions();

        // Q(s, a) = 0.5 for both rows; targets are 1.0 + 0.9 * 0.5 and 5.0.
        // Huber: 0.5 * 0.95^2 and 4.5 - 0.5, averaged.
        let loss = trainer.optimize_batch(&transitions).unwrap();
        assert!((loss - 2.225625).abs() < 1e-5, "loss = {loss}");

        // Only the online estimator moves
        assert!(differs(&outputs(&trainer.online().valid()), &[0.5; 9]));
        assert_close(&outputs(trainer.target()), &[0.5; 9]);
    }

    #[test]
    fn test_optimize_model_on_stored_transitions() {
        let params = DqnTrainerParameters {
            memory_size: 4,
            ..params(2, 1, 0.01)
        };
        let mut trainer = trainer(CountdownEnv::new(3), params);
        trainer.memory.push(Transition::new(
            vec![1.0, 0.0],
            TradingAction::Buy,
            Some(vec![0.0, 1.0]),
            1.0,
        ));
        assert_eq!(trainer.optimize_model().unwrap(), None);

        trainer
            .memory
            .push(Transition::new(vec![0.0, 1.0], TradingAction::Sell, None, 5.0));
        // Both stored transitions are sampled; the mean loss ignores their order
        let loss = trainer.optimize_model().unwrap().unwrap();
        assert!((loss - 2.225625).abs() < 1e-5, "loss = {loss}");
        assert_eq!(trainer.memory().len(), 2);
    }

    #[test]
    fn test_with_components_accepts_deterministic_generators() {
        let device = Default::default();
        let policy = EpsilonGreedyPolicy::new(PolicyConfig::default(), StepRng::new(0, 1)).unwrap();
        let memory = ReplayMemory::new(4, StepRng::new(7, 3)).unwrap();
        let mut trainer = DqnTrainer::with_components(
            linear_q(&device),
            SgdConfig::new().init::<TestBackend, LinearQ<TestBackend>>(),
            CountdownEnv::new(3),
            params(2, 1, 0.01),
            policy,
            memory,
            device,
        )
        .unwrap();

        for transition in sample_transitions() {
            trainer.memory.push(transition);
        }
        let loss = trainer.optimize_model().unwrap().unwrap();
        assert!((loss - 2.225625).abs() < 1e-5, "loss = {loss}");
        assert_eq!(trainer.memory().capacity(), 4);
        assert_close(&outputs(trainer.target()), &[0.5; 9]);
    }

    #[test]
    fn test_gradients_are_clamped() {
        let mut trainer = trainer(CountdownEnv::new(3), params(1, 1, 1.0));
        let params = DqnTrainerParameters {
            grad_clip: 0.1,
            ..trainer.params().clone()
        };
        trainer.params = params;

        // Unclamped, d loss / d w[0][Buy] = -100
        let transitions = [Transition::new(vec![100.0, 0.0], TradingAction::Buy, None, 1000.0)];
        trainer.optimize_batch(&transitions).unwrap();

        let after = outputs(&trainer.online().valid());
        // Probe row [1, 0] reads w[0][*]; SGD with lr 1 moves w[0][Buy] by exactly the bound
        assert_close(&after[0..3], &[0.5, 0.6, 0.5]);
        // w[1][*] had zero gradient
        assert_close(&after[3..6], &[0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_target_sync_schedule() {
        let mut trainer = trainer(CountdownEnv::new(4), params(2, 3, 0.05));

        // Episode 0 syncs
        let summary = trainer.train(1).unwrap();
        assert_eq!(summary.target_syncs, 1);
        assert!(summary.optimization_steps > 0);
        let snapshot = outputs(trainer.target());
        assert_close(&outputs(&trainer.online().valid()), &snapshot);

        // Episodes 1 and 2 keep the snapshot while the online estimator keeps learning
        let summary = trainer.train(2).unwrap();
        assert_eq!(summary.target_syncs, 0);
        assert_close(&outputs(trainer.target()), &snapshot);
        assert!(differs(&outputs(&trainer.online().valid()), &snapshot));

        // Episode 3 syncs again, numbering continues across calls
        let summary = trainer.train(1).unwrap();
        assert_eq!(summary.target_syncs, 1);
        assert_eq!(summary.reports[0].episode, 3);
        assert_close(&outputs(trainer.target()), &outputs(&trainer.online().valid()));
        assert_eq!(trainer.episodes_done(), 4);
    }

    #[test]
    fn test_train_reports_episodes() {
        let mut trainer = trainer(CountdownEnv::new(4), params(2, 1, 0.01));
        let summary = trainer.train(2).unwrap();

        assert_eq!(summary.episodes, 2);
        assert_eq!(summary.total_steps, 8);
        assert!(!summary.stopped_early);
        assert_eq!(summary.reports[0].total_reward, 4.0);
        assert!((summary.average_reward() - 4.0).abs() < 1e-6);
        assert!(summary.reports[1].epsilon < summary.reports[0].epsilon);
        // Three optimisation steps in the first episode, four in the second
        assert_eq!(summary.optimization_steps, 7);
        assert!(summary.reports[0].mean_loss.is_some());
        assert_eq!(trainer.policy().episodes_done(), 2);
        // The last transition of each episode is terminal
        assert_eq!(trainer.memory().iter().filter(|t| t.is_terminal()).count(), 2);
    }

    #[test]
    fn test_empty_valid_moves_aborts_training() {
        let mut env = MockEnv::new();
        env.expect_reset().returning(|| Ok(vec![0.0, 0.0]));
        env.expect_valid_moves().returning(Vec::new);
        env.expect_step().never();

        let mut trainer = trainer(env, params(2, 1, 0.01));
        assert!(matches!(trainer.train(3), Err(TraderError::EmptyValidMoves)));
        assert_eq!(trainer.episodes_done(), 0);
    }

    #[test]
    fn test_environment_error_propagates() {
        let mut env = MockEnv::new();
        env.expect_reset().returning(|| Ok(vec![0.0, 0.0]));
        env.expect_valid_moves()
            .returning(|| vec![TradingAction::Hold]);
        env.expect_step()
            .returning(|_| Err(TraderError::Environment("feed disconnected".to_string())));

        let mut trainer = trainer(env, params(2, 1, 0.01));
        assert!(matches!(trainer.train(1), Err(TraderError::Environment(_))));
    }

    #[test]
    fn test_stop_before_training_runs_nothing() {
        let mut env = MockEnv::new();
        env.expect_reset().never();

        let mut trainer = trainer(env, params(2, 1, 0.01));
        trainer.stop_signal().request_stop();

        let summary = trainer.train(5).unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.episodes, 0);
    }

    #[test]
    fn test_stop_finishes_current_episode() {
        let stop = StopSignal::new();
        let handle = stop.clone();

        let mut env = MockEnv::new();
        env.expect_reset().times(1).returning(|| Ok(vec![0.0, 1.0]));
        env.expect_valid_moves()
            .returning(|| vec![TradingAction::Hold]);
        let mut calls = 0;
        env.expect_step().times(2).returning(move |_| {
            // Request a stop mid-episode; the episode still runs to its end
            handle.request_stop();
            calls += 1;
            Ok(StepResult {
                observation: vec![0.0, 1.0],
                reward: 0.5,
                done: calls == 2,
                info: (),
            })
        });

        let mut trainer = trainer(env, params(2, 1, 0.01)).with_stop_signal(stop);
        let summary = trainer.train(10).unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.episodes, 1);
        assert_eq!(summary.total_steps, 2);
    }
}
